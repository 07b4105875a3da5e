use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Provider,
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requester" => Ok(Role::Requester),
            "provider" => Ok(Role::Provider),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    NewRequest,
    RequestAccepted,
    MechanicLocation,
    JobCompleted,
    RequestCancelled,
    StatusUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewRequest => "new-request",
            EventKind::RequestAccepted => "request-accepted",
            EventKind::MechanicLocation => "mechanic-location",
            EventKind::JobCompleted => "job-completed",
            EventKind::RequestCancelled => "request-cancelled",
            EventKind::StatusUpdate => "status-update",
        }
    }
}

/// One push to a connected client. `for_account` is embedded so fallback
/// listeners can filter client-side; `None` means the event addresses the
/// whole role.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub for_account: Option<Uuid>,
    pub role: Role,
    pub payload: Value,
}

/// Process-wide delivery fabric. The account registry is mutated only by
/// websocket join/leave; business logic just publishes by recipient id.
/// Delivery is fire-and-forget: an offline recipient misses the event and
/// nothing is rolled back.
pub struct NotificationHub {
    private: DashMap<Uuid, broadcast::Sender<Event>>,
    fallback_tx: broadcast::Sender<Event>,
    buffer: usize,
    metrics: Metrics,
}

impl NotificationHub {
    pub fn new(buffer: usize, metrics: Metrics) -> Self {
        let (fallback_tx, _unused_rx) = broadcast::channel(buffer);
        Self {
            private: DashMap::new(),
            fallback_tx,
            buffer,
            metrics,
        }
    }

    /// Joins an account's private channel. Multiple connections for the same
    /// account each get their own receiver.
    pub fn join(&self, account: Uuid) -> broadcast::Receiver<Event> {
        let rx = self
            .private
            .entry(account)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe();
        self.metrics.connected_clients.inc();
        rx
    }

    /// Drops the account's channel entry once its last receiver is gone.
    pub fn leave(&self, account: Uuid) {
        self.metrics.connected_clients.dec();
        self.private
            .remove_if(&account, |_, tx| tx.receiver_count() == 0);
    }

    pub fn subscribe_fallback(&self) -> broadcast::Receiver<Event> {
        self.fallback_tx.subscribe()
    }

    /// Delivers to the recipient's private channel (when joined) and always
    /// to the role-wide fallback with the recipient id in the envelope.
    pub fn publish_to(&self, account: Uuid, role: Role, kind: EventKind, payload: Value) {
        let event = Event {
            kind,
            for_account: Some(account),
            role,
            payload,
        };

        match self.private.get(&account) {
            Some(tx) => {
                if tx.send(event.clone()).is_err() {
                    debug!(%account, kind = kind.as_str(), "private channel has no listeners");
                }
                self.metrics
                    .events_published_total
                    .with_label_values(&[kind.as_str(), "private"])
                    .inc();
            }
            None => {
                debug!(%account, kind = kind.as_str(), "recipient not joined, fallback only");
            }
        }

        self.send_fallback(event);
    }

    /// Role-wide delivery with no specific recipient.
    pub fn publish_broadcast(&self, role: Role, kind: EventKind, payload: Value) {
        self.send_fallback(Event {
            kind,
            for_account: None,
            role,
            payload,
        });
    }

    fn send_fallback(&self, event: Event) {
        let kind = event.kind;
        if self.fallback_tx.send(event).is_err() {
            debug!(kind = kind.as_str(), "no fallback listeners connected");
        }
        self.metrics
            .events_published_total
            .with_label_values(&[kind.as_str(), "fallback"])
            .inc();
    }

    pub fn joined_accounts(&self) -> usize {
        self.private.len()
    }
}
