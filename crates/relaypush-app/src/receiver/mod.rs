//! Receiver facade
//!
//! [`PushReceiver`] is the single entry point for transport callbacks. It
//! owns the registration machine and the fetch dispatcher and makes them
//! share one [`LatestWinsExecutor`], so every relay call and fetch runs on
//! the same worker.

use std::sync::Arc;

use relaypush_core::prelude::*;
use relaypush_core::{RegistrationEvent, RegistrationSnapshot, TransportEvent};
use tokio::sync::broadcast;

use crate::executor::LatestWinsExecutor;
use crate::fetch::{FetchDispatcher, FetchJob, FetchPolicy};
use crate::registration::RegistrationMachine;
use crate::services::{
    Alerter, Clock, DeliveryPath, EventBus, FetchManager, RelayRegistrar, SystemClock,
};
use crate::store::PushValues;

#[cfg(test)]
mod tests;

/// Name of the shared worker, as it appears in logs
pub const EXECUTOR_NAME: &str = "relaypush-worker";

/// Collaborators a [`PushReceiver`] is built from
pub struct ReceiverServices<R, F> {
    pub registrar: Arc<R>,
    pub fetcher: Arc<F>,
    pub alerter: Arc<dyn Alerter>,
    pub delivery: Arc<dyn DeliveryPath>,
    pub clock: Arc<dyn Clock>,
    pub bus: EventBus,
}

impl<R, F> ReceiverServices<R, F> {
    /// Services with the system clock and a default-sized event bus
    pub fn new(
        registrar: Arc<R>,
        fetcher: Arc<F>,
        alerter: Arc<dyn Alerter>,
        delivery: Arc<dyn DeliveryPath>,
    ) -> Self {
        Self {
            registrar,
            fetcher,
            alerter,
            delivery,
            clock: Arc::new(SystemClock),
            bus: EventBus::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

}

/// Push-transport receiver: registration state plus message fetching
pub struct PushReceiver<R, F> {
    registration: RegistrationMachine<R>,
    dispatcher: FetchDispatcher<F>,
    executor: Arc<LatestWinsExecutor>,
    bus: EventBus,
}

impl<R, F> PushReceiver<R, F>
where
    R: RelayRegistrar + Send + Sync + 'static,
    F: FetchManager + Send + Sync + 'static,
{
    /// Must be called inside a tokio runtime (the worker is spawned here)
    pub fn new(values: Arc<PushValues>, services: ReceiverServices<R, F>, policy: FetchPolicy) -> Self {
        let executor = Arc::new(LatestWinsExecutor::new(EXECUTOR_NAME));

        let registration = RegistrationMachine::new(
            Arc::clone(&values),
            services.registrar,
            services.alerter,
            services.bus.clone(),
            Arc::clone(&executor),
        );
        let dispatcher = FetchDispatcher::new(
            FetchJob::new(values, services.fetcher, services.clock, policy),
            services.delivery,
            Arc::clone(&executor),
        );

        Self {
            registration,
            dispatcher,
            executor,
            bus: services.bus,
        }
    }

    /// Dispatch one transport callback
    ///
    /// Never fails: store errors are logged and the event is dropped.
    pub fn handle(&self, event: TransportEvent) {
        debug!(
            event = event.event_type(),
            instance = event.instance(),
            "Transport event"
        );

        let result = match event {
            TransportEvent::NewEndpoint { endpoint, .. } => {
                self.registration.on_new_endpoint(endpoint)
            }
            TransportEvent::RegistrationFailed { .. } => {
                self.registration.on_registration_failed();
                Ok(())
            }
            TransportEvent::Unregistered { .. } => self.registration.on_unregistered(),
            TransportEvent::Message { payload, .. } => {
                trace!(bytes = payload.len(), "Message payload left for downstream");
                self.dispatcher.on_message();
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Failed to handle transport event: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> Result<RegistrationSnapshot> {
        self.registration.snapshot()
    }

    pub fn retry_registration(&self) {
        self.registration.retry_registration();
    }

    /// Persist and publish the air-gapped mode before returning
    pub fn set_air_gapped(&self, enabled: bool) -> Result<()> {
        self.registration.set_air_gapped(enabled)
    }

    /// Wait until the worker has nothing running or pending
    pub async fn wait_idle(&self) {
        self.executor.wait_idle().await;
    }

    /// Tasks the worker discarded because a newer one replaced them
    pub fn dropped_tasks(&self) -> u64 {
        self.executor.dropped_count()
    }
}

impl<R, F> std::fmt::Debug for PushReceiver<R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushReceiver")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
