//! Tests for the receiver facade, driven through transport events

use std::time::Duration;

use super::*;
use crate::delivery::StoreDeliveryPath;
use crate::fetch::DEFAULT_FOREGROUND_COOLDOWN;
use crate::test_utils::{
    FetchResponse, ManualClock, RecordingAlerter, RecordingFetcher, RecordingRegistrar,
    StaticDeliveryPath,
};
use relaypush_core::{AlertKind, Endpoint, FetchStrategy, RegistrationStatus};

const START_MS: u64 = 1_700_000_000_000;

struct Fixture {
    receiver: PushReceiver<RecordingRegistrar, RecordingFetcher>,
    values: Arc<PushValues>,
    registrar: Arc<RecordingRegistrar>,
    fetcher: Arc<RecordingFetcher>,
    alerter: Arc<RecordingAlerter>,
    clock: Arc<ManualClock>,
    rx: broadcast::Receiver<RegistrationEvent>,
}

impl Fixture {
    fn new(status: RegistrationStatus, endpoint: Option<&str>, registrar: RecordingRegistrar) -> Self {
        Self::build(status, endpoint, registrar, |_| {
            Arc::new(StaticDeliveryPath::new(true)) as Arc<dyn DeliveryPath>
        })
    }

    fn build(
        status: RegistrationStatus,
        endpoint: Option<&str>,
        registrar: RecordingRegistrar,
        delivery: impl FnOnce(Arc<PushValues>) -> Arc<dyn DeliveryPath>,
    ) -> Self {
        let values = Arc::new(PushValues::in_memory());
        values.set_status(status).unwrap();
        if let Some(endpoint) = endpoint {
            values.replace_endpoint(&Endpoint::new(endpoint)).unwrap();
        }

        let registrar = Arc::new(registrar);
        let fetcher = Arc::new(RecordingFetcher::new(FetchResponse::Accept));
        let alerter = Arc::new(RecordingAlerter::new());
        let clock = Arc::new(ManualClock::new(START_MS));

        let services = ReceiverServices::new(
            Arc::clone(&registrar),
            Arc::clone(&fetcher),
            alerter.clone(),
            delivery(Arc::clone(&values)),
        )
        .with_clock(clock.clone());

        let receiver = PushReceiver::new(Arc::clone(&values), services, FetchPolicy::default());
        let rx = receiver.subscribe();

        Self {
            receiver,
            values,
            registrar,
            fetcher,
            alerter,
            clock,
            rx,
        }
    }

    async fn send(&self, event: TransportEvent) {
        self.receiver.handle(event);
        self.receiver.wait_idle().await;
    }

    /// Registration snapshots published so far
    fn published(&mut self) -> Vec<RegistrationSnapshot> {
        std::iter::from_fn(|| self.rx.try_recv().ok())
            .map(|RegistrationEvent::RegistrationChanged(snapshot)| snapshot)
            .collect()
    }
}

fn new_endpoint(endpoint: &str) -> TransportEvent {
    TransportEvent::NewEndpoint {
        endpoint: Endpoint::new(endpoint),
        instance: "default".to_string(),
    }
}

fn message() -> TransportEvent {
    TransportEvent::Message {
        payload: b"ciphertext".to_vec(),
        instance: "default".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_same_endpoint_is_ignored() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(new_endpoint("A")).await;

    assert_eq!(f.registrar.call_count(), 0);
    assert!(f.published().is_empty());
    assert!(f.alerter.alerts().is_empty());
    assert_eq!(
        f.receiver.snapshot().unwrap(),
        RegistrationSnapshot {
            endpoint: Some(Endpoint::new("A")),
            status: RegistrationStatus::Registered,
        }
    );
}

#[tokio::test]
async fn test_registration_calls_per_prior_status() {
    for prior in RegistrationStatus::ALL {
        let f = Fixture::new(
            prior,
            Some("A"),
            RecordingRegistrar::new(RegistrationStatus::Registered),
        );

        f.send(new_endpoint("B")).await;

        let expected = match prior {
            RegistrationStatus::Registered
            | RegistrationStatus::InternalError
            | RegistrationStatus::MissingEndpoint => 1,
            RegistrationStatus::AirGapped | RegistrationStatus::Unconfigured => 0,
        };
        assert_eq!(f.registrar.call_count(), expected, "prior status {prior}");
        assert_eq!(f.values.endpoint().unwrap(), Some(Endpoint::new("B")));
    }
}

#[tokio::test]
async fn test_endpoint_change_while_registered_succeeds_quietly() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(new_endpoint("B")).await;

    assert!(f.alerter.alerts().is_empty());
    assert_eq!(
        f.published(),
        vec![RegistrationSnapshot {
            endpoint: Some(Endpoint::new("B")),
            status: RegistrationStatus::Registered,
        }]
    );
    assert_eq!(f.registrar.calls(), vec![Some(Endpoint::new("B"))]);
}

#[tokio::test]
async fn test_endpoint_change_while_registered_rejected_alerts() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::MissingEndpoint),
    );

    f.send(new_endpoint("B")).await;

    assert_eq!(f.alerter.alerts(), vec![AlertKind::EndpointChangedError]);
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::MissingEndpoint);
    assert_eq!(f.published().len(), 1);
}

#[tokio::test]
async fn test_endpoint_change_while_air_gapped() {
    let mut f = Fixture::new(
        RegistrationStatus::AirGapped,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(new_endpoint("B")).await;

    assert_eq!(f.registrar.call_count(), 0);
    assert_eq!(f.alerter.alerts(), vec![AlertKind::EndpointChangedAirGapped]);
    assert_eq!(
        f.published(),
        vec![RegistrationSnapshot {
            endpoint: Some(Endpoint::new("B")),
            status: RegistrationStatus::AirGapped,
        }]
    );
}

#[tokio::test]
async fn test_error_status_recovers_on_next_endpoint() {
    let f = Fixture::new(
        RegistrationStatus::InternalError,
        Some("A"),
        RecordingRegistrar::scripted([RegistrationStatus::InternalError]),
    );

    f.send(new_endpoint("B")).await;
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::InternalError);

    f.send(new_endpoint("C")).await;
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::Registered);
    assert!(f.alerter.alerts().is_empty());
}

#[tokio::test]
async fn test_registration_failed_only_alerts() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(TransportEvent::RegistrationFailed {
        instance: "default".to_string(),
    })
    .await;

    assert_eq!(f.alerter.count(AlertKind::RegistrationFailed), 1);
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::Registered);
    assert!(f.published().is_empty());
}

#[tokio::test]
async fn test_unregistered_clears_endpoint() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(TransportEvent::Unregistered {
        instance: "default".to_string(),
    })
    .await;

    let published = f.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].endpoint, None);
    assert_eq!(f.values.endpoint().unwrap(), None);
}

#[tokio::test]
async fn test_retry_and_air_gap_through_facade() {
    let f = Fixture::new(
        RegistrationStatus::MissingEndpoint,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.receiver.retry_registration();
    f.receiver.wait_idle().await;
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::Registered);

    f.receiver.set_air_gapped(true).unwrap();
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::AirGapped);

    f.send(new_endpoint("B")).await;
    assert_eq!(f.registrar.call_count(), 1);
}

#[tokio::test]
async fn test_air_gap_switch_survives_queued_message() {
    let mut f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    // Park the worker so the next submission waits in the pending slot.
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    f.receiver.executor.submit(async move {
        let _ = started_tx.send(());
        let _ = release_rx.await;
        Ok::<(), Error>(())
    });
    started_rx.await.unwrap();

    f.receiver.set_air_gapped(true).unwrap();
    f.receiver.handle(message());
    release_tx.send(()).unwrap();
    f.receiver.wait_idle().await;

    assert_eq!(f.values.status().unwrap(), RegistrationStatus::AirGapped);
    assert_eq!(f.fetcher.enqueued(), vec![FetchStrategy::Foreground]);
    assert_eq!(
        f.published(),
        vec![RegistrationSnapshot {
            endpoint: Some(Endpoint::new("A")),
            status: RegistrationStatus::AirGapped,
        }]
    );
}

#[tokio::test]
async fn test_leaving_air_gap_registers_stored_endpoint() {
    let mut f = Fixture::new(
        RegistrationStatus::AirGapped,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.receiver.set_air_gapped(false).unwrap();
    assert_eq!(f.values.status().unwrap(), RegistrationStatus::Unconfigured);
    f.receiver.wait_idle().await;

    assert_eq!(f.registrar.calls(), vec![Some(Endpoint::new("A"))]);
    let statuses: Vec<_> = f.published().into_iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![RegistrationStatus::Unconfigured, RegistrationStatus::Registered]
    );
}

// ─────────────────────────────────────────────────────────────────
// Message fetching
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_messages_within_cooldown_use_one_foreground_fetch() {
    let f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(message()).await;
    f.clock.advance(Duration::from_secs(90));
    f.send(message()).await;
    f.clock.advance(Duration::from_secs(89));
    f.send(message()).await;

    assert_eq!(
        f.fetcher.enqueued(),
        vec![
            FetchStrategy::Foreground,
            FetchStrategy::Background,
            FetchStrategy::Background,
        ]
    );
}

#[tokio::test]
async fn test_foreground_fetch_resumes_after_cooldown() {
    let f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(message()).await;
    f.clock.advance(DEFAULT_FOREGROUND_COOLDOWN);
    f.send(message()).await;
    f.clock.advance(Duration::from_millis(1));
    f.send(message()).await;

    assert_eq!(
        f.fetcher.enqueued(),
        vec![
            FetchStrategy::Foreground,
            FetchStrategy::Background,
            FetchStrategy::Foreground,
        ]
    );
}

#[tokio::test]
async fn test_refused_fetch_falls_back_once_per_message() {
    let f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );
    f.fetcher.set_response(FetchResponse::Reject);

    f.send(message()).await;
    assert_eq!(f.fetcher.legacy_pulls(), 1);

    f.fetcher.set_response(FetchResponse::Fail);
    f.send(message()).await;
    assert_eq!(f.fetcher.legacy_pulls(), 2);

    assert_eq!(
        f.fetcher.enqueued(),
        vec![FetchStrategy::Foreground, FetchStrategy::Background]
    );
}

#[tokio::test]
async fn test_accepted_fetch_does_not_fall_back() {
    let f = Fixture::new(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
    );

    f.send(message()).await;

    assert_eq!(f.fetcher.legacy_pulls(), 0);
}

#[tokio::test]
async fn test_message_ignored_after_unregister() {
    let f = Fixture::build(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
        |values| Arc::new(StoreDeliveryPath::new(values, true)) as Arc<dyn DeliveryPath>,
    );

    f.send(message()).await;
    assert_eq!(f.fetcher.enqueued().len(), 1);

    f.send(TransportEvent::Unregistered {
        instance: "default".to_string(),
    })
    .await;
    f.send(message()).await;

    assert_eq!(f.fetcher.enqueued().len(), 1);
    assert_eq!(f.fetcher.legacy_pulls(), 0);
}

#[tokio::test]
async fn test_message_ignored_when_transport_inactive() {
    let f = Fixture::build(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
        |_| Arc::new(StaticDeliveryPath::new(false)) as Arc<dyn DeliveryPath>,
    );

    f.send(message()).await;

    assert!(f.fetcher.enqueued().is_empty());
    assert_eq!(f.fetcher.legacy_pulls(), 0);
}

#[tokio::test]
async fn test_transport_turned_off_between_messages() {
    let delivery = Arc::new(StaticDeliveryPath::new(true));
    let path = Arc::clone(&delivery);
    let f = Fixture::build(
        RegistrationStatus::Registered,
        Some("A"),
        RecordingRegistrar::new(RegistrationStatus::Registered),
        move |_| path as Arc<dyn DeliveryPath>,
    );

    f.send(message()).await;
    delivery.set_active(false);
    f.clock.advance(DEFAULT_FOREGROUND_COOLDOWN * 2);
    f.send(message()).await;
    delivery.set_active(true);
    f.send(message()).await;

    assert_eq!(
        f.fetcher.enqueued(),
        vec![FetchStrategy::Foreground, FetchStrategy::Foreground]
    );
}
