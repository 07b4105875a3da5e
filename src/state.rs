use crate::hub::NotificationHub;
use crate::observability::metrics::Metrics;
use crate::store::{RequestStore, ShopStore};

pub struct AppState {
    pub requests: RequestStore,
    pub shops: ShopStore,
    pub hub: NotificationHub,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let metrics = Metrics::new();

        Self {
            requests: RequestStore::default(),
            shops: ShopStore::default(),
            hub: NotificationHub::new(event_buffer_size, metrics.clone()),
            metrics,
        }
    }
}
