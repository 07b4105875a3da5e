use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::request::ServiceRequest;
use crate::models::shop::Shop;

/// Outcome of a conditional update against a single record.
/// `PreconditionFailed` means the record exists but its current state did not
/// satisfy the caller's precondition; nothing was written.
#[derive(Debug)]
pub enum UpdateOutcome<T> {
    Updated(T),
    PreconditionFailed,
    Missing,
}

/// Request records keyed by id. Every lifecycle transition goes through
/// `update_if`: the precondition check and the mutation run under the
/// entry's exclusive reference, so concurrent writers to the same record
/// serialize and at most one compare-and-set commits.
#[derive(Default)]
pub struct RequestStore {
    records: DashMap<Uuid, ServiceRequest>,
}

impl RequestStore {
    pub fn insert(&self, request: ServiceRequest) {
        self.records.insert(request.id, request);
    }

    pub fn get(&self, id: Uuid) -> Option<ServiceRequest> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    pub fn update_if<P, A>(&self, id: Uuid, precondition: P, apply: A) -> UpdateOutcome<ServiceRequest>
    where
        P: FnOnce(&ServiceRequest) -> bool,
        A: FnOnce(&mut ServiceRequest),
    {
        match self.records.get_mut(&id) {
            Some(mut entry) => {
                if !precondition(entry.value()) {
                    return UpdateOutcome::PreconditionFailed;
                }
                apply(entry.value_mut());
                UpdateOutcome::Updated(entry.value().clone())
            }
            None => UpdateOutcome::Missing,
        }
    }

    /// Snapshot of every record matching the filter. Scans are advisory
    /// reads; only `update_if` writes.
    pub fn find<F>(&self, filter: F) -> Vec<ServiceRequest>
    where
        F: Fn(&ServiceRequest) -> bool,
    {
        self.records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn find_one<F>(&self, filter: F) -> Option<ServiceRequest>
    where
        F: Fn(&ServiceRequest) -> bool,
    {
        self.records
            .iter()
            .find(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Shop records keyed by shop id, with a provider-id index enforcing the
/// one-profile-per-provider constraint at insert time.
#[derive(Default)]
pub struct ShopStore {
    records: DashMap<Uuid, Shop>,
    by_provider: DashMap<Uuid, Uuid>,
}

impl ShopStore {
    /// Registers a new shop. Returns false without writing when the provider
    /// already has one.
    pub fn register(&self, shop: Shop) -> bool {
        match self.by_provider.entry(shop.provider_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(shop.id);
                self.records.insert(shop.id, shop);
                true
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Shop> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_by_provider(&self, provider_id: Uuid) -> Option<Shop> {
        let shop_id = *self.by_provider.get(&provider_id)?;
        self.get(shop_id)
    }

    /// Unconditional read-modify-write on a provider's shop. Used for
    /// last-write-wins fields (position, availability) and rating appends.
    pub fn update_by_provider<A>(&self, provider_id: Uuid, apply: A) -> Option<Shop>
    where
        A: FnOnce(&mut Shop),
    {
        let shop_id = *self.by_provider.get(&provider_id)?;
        let mut entry = self.records.get_mut(&shop_id)?;
        apply(entry.value_mut());
        Some(entry.value().clone())
    }

    pub fn list(&self) -> Vec<Shop> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn online(&self) -> Vec<Shop> {
        self.records
            .iter()
            .filter(|entry| entry.value().is_online)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
