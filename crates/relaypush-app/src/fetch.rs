//! Message-fetch dispatcher
//!
//! On every inbound message the dispatcher picks a fetch strategy, asks the
//! fetch service to enqueue it and falls back to a legacy pull when the
//! service refuses. Foreground fetches are rate limited by a cooldown whose
//! start time is persisted, so bursts of messages pay for at most one
//! foreground fetch per window.

use std::sync::Arc;
use std::time::Duration;

use relaypush_core::prelude::*;
use relaypush_core::FetchStrategy;

use crate::executor::LatestWinsExecutor;
use crate::services::{Clock, DeliveryPath, FetchManager};
use crate::store::PushValues;

/// Minimum spacing between two cooldown-driven foreground fetches
pub const DEFAULT_FOREGROUND_COOLDOWN: Duration = Duration::from_secs(3 * 60);

/// Rules for choosing between foreground and background fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Always fetch in the foreground, ignoring the cooldown
    pub foreground_mandatory: bool,
    /// The platform needs periodic foreground fetches for reliable delivery
    pub platform_requires_foreground: bool,
    pub cooldown: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            foreground_mandatory: false,
            platform_requires_foreground: true,
            cooldown: DEFAULT_FOREGROUND_COOLDOWN,
        }
    }
}

impl FetchPolicy {
    /// Pick a strategy given the time since the last foreground fetch
    ///
    /// The cooldown must be strictly exceeded.
    pub fn select(&self, since_last_foreground: Duration) -> FetchStrategy {
        if self.foreground_mandatory
            || (self.platform_requires_foreground && since_last_foreground > self.cooldown)
        {
            FetchStrategy::Foreground
        } else {
            FetchStrategy::Background
        }
    }
}

/// What a single fetch task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub strategy: FetchStrategy,
    /// The fetch service accepted the request
    pub enqueued: bool,
    /// The legacy pull was attempted
    pub fell_back: bool,
}

/// Body of the task queued for each message
pub struct FetchJob<F> {
    values: Arc<PushValues>,
    fetcher: Arc<F>,
    clock: Arc<dyn Clock>,
    policy: FetchPolicy,
}

impl<F> FetchJob<F>
where
    F: FetchManager + Send + Sync + 'static,
{
    pub fn new(
        values: Arc<PushValues>,
        fetcher: Arc<F>,
        clock: Arc<dyn Clock>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            values,
            fetcher,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Select, enqueue and fall back if needed
    ///
    /// Store failures are logged and do not prevent the fetch itself.
    pub async fn run_fetch(&self) -> FetchOutcome {
        let now = self.clock.now_ms();
        let last = self.values.last_foreground_fetch_ms().unwrap_or_else(|e| {
            warn!("Could not read last foreground fetch time: {}", e);
            0
        });
        let strategy = self
            .policy
            .select(Duration::from_millis(now.saturating_sub(last)));

        if strategy.is_foreground() {
            if let Err(e) = self.values.set_last_foreground_fetch_ms(now) {
                warn!("Could not record foreground fetch time: {}", e);
            }
        }

        let enqueued = match self.fetcher.enqueue(strategy).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(%strategy, "Fetch service refused the request");
                false
            }
            Err(e) => {
                warn!(%strategy, "Failed to enqueue fetch: {}", e);
                false
            }
        };

        if !enqueued {
            debug!("Falling back to legacy pull");
            if let Err(e) = self.fetcher.legacy_pull().await {
                warn!("Legacy pull failed: {}", e);
            }
        }

        FetchOutcome {
            strategy,
            enqueued,
            fell_back: !enqueued,
        }
    }

    async fn execute(&self) -> Result<()> {
        let outcome = self.run_fetch().await;
        debug!(?outcome, "Fetch finished");
        Ok(())
    }
}

/// Turns message notifications into queued fetch tasks
pub struct FetchDispatcher<F> {
    job: Arc<FetchJob<F>>,
    delivery: Arc<dyn DeliveryPath>,
    executor: Arc<LatestWinsExecutor>,
}

impl<F> FetchDispatcher<F>
where
    F: FetchManager + Send + Sync + 'static,
{
    pub fn new(
        job: FetchJob<F>,
        delivery: Arc<dyn DeliveryPath>,
        executor: Arc<LatestWinsExecutor>,
    ) -> Self {
        Self {
            job: Arc::new(job),
            delivery,
            executor,
        }
    }

    /// Queue a fetch for an inbound message
    ///
    /// Returns `false` when the alternate transport is not the active
    /// delivery path and the message was ignored.
    pub fn on_message(&self) -> bool {
        if !self.delivery.is_alternate_transport_active() {
            debug!("Alternate transport inactive, ignoring message");
            return false;
        }

        let job = Arc::clone(&self.job);
        self.executor.submit(async move { job.execute().await });
        true
    }
}

impl<F> std::fmt::Debug for FetchDispatcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchDispatcher")
            .field("policy", &self.job.policy)
            .finish_non_exhaustive()
    }
}
