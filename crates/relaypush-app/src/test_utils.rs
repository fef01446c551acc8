//! Test utilities for the state machine and dispatcher
//!
//! Recording fakes for every collaborator trait. Each fake keeps what it was
//! asked to do so tests can assert on calls after `wait_idle()`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use relaypush_core::prelude::*;
use relaypush_core::{AlertKind, Endpoint, FetchStrategy, RegistrationStatus};

use crate::services::{Alerter, Clock, DeliveryPath, FetchManager, RelayRegistrar};

/// Registrar that answers from a script, then with a fixed default
#[derive(Debug)]
pub struct RecordingRegistrar {
    scripted: Mutex<VecDeque<RegistrationStatus>>,
    default: RegistrationStatus,
    calls: Mutex<Vec<Option<Endpoint>>>,
}

impl RecordingRegistrar {
    /// Always answer `result`
    pub fn new(result: RegistrationStatus) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default: result,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `results` in order, then `Registered`
    pub fn scripted(results: impl IntoIterator<Item = RegistrationStatus>) -> Self {
        let registrar = Self::new(RegistrationStatus::Registered);
        registrar.scripted.lock().unwrap().extend(results);
        registrar
    }

    /// Endpoints passed to each call, in order
    pub fn calls(&self) -> Vec<Option<Endpoint>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RelayRegistrar for RecordingRegistrar {
    async fn register(&self, endpoint: Option<Endpoint>) -> RegistrationStatus {
        self.calls.lock().unwrap().push(endpoint);
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}

/// How [`RecordingFetcher`] answers `enqueue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResponse {
    /// `Ok(true)`
    Accept,
    /// `Ok(false)`
    Reject,
    /// `Err(..)`
    Fail,
}

#[derive(Debug)]
pub struct RecordingFetcher {
    response: Mutex<FetchResponse>,
    enqueued: Mutex<Vec<FetchStrategy>>,
    legacy_pulls: AtomicUsize,
    legacy_pull_fails: bool,
}

impl RecordingFetcher {
    pub fn new(response: FetchResponse) -> Self {
        Self {
            response: Mutex::new(response),
            enqueued: Mutex::new(Vec::new()),
            legacy_pulls: AtomicUsize::new(0),
            legacy_pull_fails: false,
        }
    }

    pub fn with_failing_legacy_pull(mut self) -> Self {
        self.legacy_pull_fails = true;
        self
    }

    pub fn set_response(&self, response: FetchResponse) {
        *self.response.lock().unwrap() = response;
    }

    /// Strategies passed to `enqueue`, whatever the answer was
    pub fn enqueued(&self) -> Vec<FetchStrategy> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn legacy_pulls(&self) -> usize {
        self.legacy_pulls.load(Ordering::SeqCst)
    }
}

impl FetchManager for RecordingFetcher {
    async fn enqueue(&self, strategy: FetchStrategy) -> Result<bool> {
        self.enqueued.lock().unwrap().push(strategy);
        let response = *self.response.lock().unwrap();
        match response {
            FetchResponse::Accept => Ok(true),
            FetchResponse::Reject => Ok(false),
            FetchResponse::Fail => Err(Error::hook("fetch service unavailable")),
        }
    }

    async fn legacy_pull(&self) -> Result<()> {
        self.legacy_pulls.fetch_add(1, Ordering::SeqCst);
        if self.legacy_pull_fails {
            return Err(Error::hook("legacy pull timed out"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingAlerter {
    alerts: Mutex<Vec<AlertKind>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertKind> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == kind)
            .count()
    }
}

impl Alerter for RecordingAlerter {
    fn alert(&self, kind: AlertKind) {
        self.alerts.lock().unwrap().push(kind);
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StaticDeliveryPath {
    active: AtomicBool,
}

impl StaticDeliveryPath {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl DeliveryPath for StaticDeliveryPath {
    fn is_alternate_transport_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_registrar_falls_back_to_registered() {
        let registrar = RecordingRegistrar::scripted([RegistrationStatus::InternalError]);

        assert_eq!(
            registrar.register(None).await,
            RegistrationStatus::InternalError
        );
        assert_eq!(
            registrar.register(Some(Endpoint::new("B"))).await,
            RegistrationStatus::Registered
        );
        assert_eq!(registrar.calls(), vec![None, Some(Endpoint::new("B"))]);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
