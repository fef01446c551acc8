//! Registration state machine
//!
//! Reacts to endpoint changes from the transport and decides whether to
//! contact the relay, what to persist and what to tell the user. The branch
//! taken depends on the status *before* the event:
//!
//! | Prior status | Relay call | Alert |
//! |--------------|------------|-------|
//! | `AirGapped` | no | `EndpointChangedAirGapped` |
//! | `Registered` | yes | `EndpointChangedError` if the result is not `Registered` |
//! | `InternalError`, `MissingEndpoint` | yes | none |
//! | `Unconfigured` | no | none |
//!
//! Relay calls and their status writes run on the shared
//! [`LatestWinsExecutor`], so readers only ever see terminal statuses. The
//! air-gapped switch is a user setting and is applied on the caller.

use std::sync::Arc;

use relaypush_core::prelude::*;
use relaypush_core::{
    AlertKind, Endpoint, RegistrationEvent, RegistrationSnapshot, RegistrationStatus,
};

use crate::executor::LatestWinsExecutor;
use crate::services::{Alerter, EventBus, RelayRegistrar};
use crate::store::PushValues;

/// State the queued tasks need; shared between the machine and its tasks
struct Inner<R> {
    values: Arc<PushValues>,
    registrar: Arc<R>,
    alerter: Arc<dyn Alerter>,
    bus: EventBus,
}

impl<R> Inner<R>
where
    R: RelayRegistrar + Send + Sync + 'static,
{
    fn publish_changed(&self) {
        match self.values.snapshot() {
            Ok(snapshot) => self
                .bus
                .publish(RegistrationEvent::RegistrationChanged(snapshot)),
            Err(e) => warn!("Not publishing registration change: {}", e),
        }
    }

    /// Call the relay, persist the outcome and notify observers
    ///
    /// An outcome that arrives after the user switched to air-gapped mode is
    /// discarded.
    async fn register_and_report(&self, alert_on_failure: bool) -> Result<()> {
        let endpoint = self.values.endpoint()?;
        let status = self.registrar.register(endpoint).await;
        if !self.values.record_relay_result(status)? {
            info!(%status, "Air-gapped during relay registration, discarding result");
            return Ok(());
        }
        info!(%status, "Relay registration finished");
        self.publish_changed();

        if alert_on_failure && status != RegistrationStatus::Registered {
            self.alerter.alert(AlertKind::EndpointChangedError);
        }
        Ok(())
    }

    async fn retry(&self) -> Result<()> {
        if self.values.status()? == RegistrationStatus::AirGapped {
            debug!("Air-gapped, nothing to retry");
            return Ok(());
        }

        if self.values.endpoint()?.is_none() {
            info!("No endpoint to register");
            if self
                .values
                .record_relay_result(RegistrationStatus::MissingEndpoint)?
            {
                self.publish_changed();
            }
            return Ok(());
        }

        self.register_and_report(false).await
    }
}

/// Tracks the endpoint and registration status of the alternate transport
pub struct RegistrationMachine<R> {
    inner: Arc<Inner<R>>,
    executor: Arc<LatestWinsExecutor>,
}

impl<R> RegistrationMachine<R>
where
    R: RelayRegistrar + Send + Sync + 'static,
{
    pub fn new(
        values: Arc<PushValues>,
        registrar: Arc<R>,
        alerter: Arc<dyn Alerter>,
        bus: EventBus,
        executor: Arc<LatestWinsExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                values,
                registrar,
                alerter,
                bus,
            }),
            executor,
        }
    }

    /// Handle an endpoint handed out by the transport
    ///
    /// An endpoint equal to the stored one is ignored entirely. Otherwise it
    /// is persisted right away and the prior status picks the follow-up.
    pub fn on_new_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let status = self.inner.values.status()?;
        if !self.inner.values.replace_endpoint(&endpoint)? {
            debug!(%endpoint, "Endpoint unchanged, ignoring");
            return Ok(());
        }
        info!(%endpoint, %status, "Endpoint changed");

        match status {
            RegistrationStatus::AirGapped => {
                self.inner.publish_changed();
                self.inner.alerter.alert(AlertKind::EndpointChangedAirGapped);
            }
            RegistrationStatus::Registered => self.submit_registration(true),
            RegistrationStatus::InternalError | RegistrationStatus::MissingEndpoint => {
                self.submit_registration(false)
            }
            RegistrationStatus::Unconfigured => self.inner.publish_changed(),
        }
        Ok(())
    }

    /// The transport could not register; status is left as is
    pub fn on_registration_failed(&self) {
        info!("Transport registration failed");
        self.inner.alerter.alert(AlertKind::RegistrationFailed);
    }

    /// The transport revoked our registration
    pub fn on_unregistered(&self) -> Result<()> {
        info!("Transport unregistered, clearing endpoint");
        self.inner.values.clear_endpoint()?;
        self.inner.publish_changed();
        Ok(())
    }

    /// Queue a fresh registration attempt for the stored endpoint
    ///
    /// Does nothing while air-gapped. With no endpoint stored the status
    /// becomes `MissingEndpoint`.
    pub fn retry_registration(&self) {
        let inner = Arc::clone(&self.inner);
        self.executor.submit(async move { inner.retry().await });
    }

    /// Switch air-gapped mode on or off
    ///
    /// The new status is persisted and published before this returns.
    /// Leaving air-gapped mode resets the status to `Unconfigured` and, when
    /// an endpoint is stored, queues a registration for it.
    pub fn set_air_gapped(&self, enabled: bool) -> Result<()> {
        if !self.inner.values.switch_air_gapped(enabled)? {
            debug!(enabled, "Air-gapped mode unchanged");
            return Ok(());
        }
        info!(enabled, "Air-gapped mode switched");
        self.inner.publish_changed();

        if !enabled && self.inner.values.endpoint()?.is_some() {
            self.submit_registration(false);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<RegistrationSnapshot> {
        self.inner.values.snapshot()
    }

    fn submit_registration(&self, alert_on_failure: bool) {
        let inner = Arc::clone(&self.inner);
        self.executor
            .submit(async move { inner.register_and_report(alert_on_failure).await });
    }
}

impl<R> std::fmt::Debug for RegistrationMachine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationMachine")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
