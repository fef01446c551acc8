//! Collaborator interfaces
//!
//! Everything the state machine and the dispatcher need from the outside
//! world: the relay, the fetch service, the user, the clock and observers.
//! Async collaborators are declared with `trait_variant` so generic code can
//! require `Send` futures; implement the `Send` variant
//! ([`RelayRegistrar`], [`FetchManager`]) with plain `async fn`.

use relaypush_core::prelude::*;
use relaypush_core::{AlertKind, Endpoint, FetchStrategy, RegistrationEvent, RegistrationStatus};
use tokio::sync::broadcast;

/// Registers the current endpoint with the remote relay
#[trait_variant::make(RelayRegistrar: Send)]
pub trait LocalRelayRegistrar {
    /// Perform one registration round-trip
    ///
    /// Never fails: every outcome is expressed as a status. `endpoint` is the
    /// stored endpoint at the time the task runs (`None` if unset).
    async fn register(&self, endpoint: Option<Endpoint>) -> RegistrationStatus;
}

/// Requests message retrieval from the fetch service
#[trait_variant::make(FetchManager: Send)]
pub trait LocalFetchManager {
    /// Enqueue a fetch; `Ok(false)` means the request was refused
    async fn enqueue(&self, strategy: FetchStrategy) -> Result<bool>;

    /// Synchronous on-demand retrieval used when enqueueing fails
    async fn legacy_pull(&self) -> Result<()>;
}

/// Raises user-visible notifications
#[cfg_attr(test, mockall::automock)]
pub trait Alerter: Send + Sync {
    fn alert(&self, kind: AlertKind);
}

/// Whether the alternate transport is the active delivery path right now
#[cfg_attr(test, mockall::automock)]
pub trait DeliveryPath: Send + Sync {
    fn is_alternate_transport_active(&self) -> bool;
}

/// Wall clock in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Default broadcast capacity for registration events
pub const EVENT_BUS_CAPACITY: usize = 64;

/// Fan-out of [`RegistrationEvent`]s to any number of observers
///
/// Publishing with no subscribers is fine; slow subscribers lag and miss
/// events rather than blocking the worker.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RegistrationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RegistrationEvent) {
        trace!(event = event.event_type(), "Publishing registration event");
        // Err only when nobody listens.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
