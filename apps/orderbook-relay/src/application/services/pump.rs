//! Update Pump
//!
//! One pump per (connection, symbol) lease. Each pump loops poll, push,
//! sleep until its lease is no longer current in the registry, then exits
//! for good. There is no external kill signal: unsubscribe and disconnect
//! only edit the registry and the pump notices at its next check.
//!
//! Worst-case stop latency is one poll interval plus one fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use super::upstream::UpstreamState;
use crate::application::ports::{MarketDataSource, SnapshotSink};
use crate::domain::subscription::{Subscription, SubscriptionRegistry};
use crate::infrastructure::metrics;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pump settings.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Delay between the end of one iteration and the next poll.
    pub poll_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Summary of a finished pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Fetch attempts made.
    pub polls: u64,
    /// Snapshots delivered to the sink.
    pub pushed: u64,
}

/// Polling loop for a single subscription lease.
pub struct UpdatePump {
    lease: Subscription,
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn SnapshotSink>,
    upstream: Arc<UpstreamState>,
    config: PumpConfig,
}

impl UpdatePump {
    /// Run until the lease stops being current.
    pub async fn run(self) -> PumpReport {
        let conn_id = self.lease.connection();
        let symbol = self.lease.symbol().to_string();
        let mut report = PumpReport::default();

        tracing::debug!(%conn_id, %symbol, "Pump started");

        while self.registry.is_current(&self.lease) {
            report.polls += 1;
            let started = Instant::now();

            match self.source.fetch_snapshot(&symbol).await {
                Ok(snapshot) => {
                    self.upstream.record_success();
                    metrics::record_fetch_duration(started.elapsed());

                    // Unsubscribed or dropped while the fetch was in flight
                    if !self.registry.is_current(&self.lease) {
                        break;
                    }

                    match self.sink.push(&snapshot).await {
                        Ok(()) => {
                            report.pushed += 1;
                            metrics::record_snapshot_pushed();
                        }
                        Err(e) => {
                            metrics::record_push_error();
                            tracing::warn!(%conn_id, %symbol, error = %e, "Snapshot push failed");
                        }
                    }
                }
                Err(e) => {
                    self.upstream.record_failure(&e);
                    metrics::record_fetch_error();
                    tracing::warn!(%conn_id, %symbol, error = %e, "Snapshot fetch failed");
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        tracing::debug!(
            %conn_id,
            %symbol,
            polls = report.polls,
            pushed = report.pushed,
            "Pump stopped"
        );
        report
    }
}

/// Spawns pumps and tracks the ones still running.
#[derive(Clone)]
pub struct PumpSet {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn MarketDataSource>,
    upstream: Arc<UpstreamState>,
    config: PumpConfig,
    tracker: TaskTracker,
}

impl PumpSet {
    /// Create a pump set sharing one registry and market data source.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn MarketDataSource>,
        upstream: Arc<UpstreamState>,
        config: PumpConfig,
    ) -> Self {
        Self {
            registry,
            source,
            upstream,
            config,
            tracker: TaskTracker::new(),
        }
    }

    /// Start a pump for a freshly issued lease.
    pub fn spawn(
        &self,
        lease: Subscription,
        sink: Arc<dyn SnapshotSink>,
    ) -> JoinHandle<PumpReport> {
        let pump = UpdatePump {
            lease,
            registry: Arc::clone(&self.registry),
            source: Arc::clone(&self.source),
            sink,
            upstream: Arc::clone(&self.upstream),
            config: self.config,
        };

        metrics::pump_started();
        self.tracker.spawn(async move {
            let report = pump.run().await;
            metrics::pump_stopped();
            report
        })
    }

    /// Number of pumps still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until no pumps remain.
    ///
    /// Pumps only stop once their subscriptions are gone, so callers remove
    /// those first. Spawning stays possible while waiting.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Shared upstream health tracker.
    #[must_use]
    pub fn upstream(&self) -> &Arc<UpstreamState> {
        &self.upstream
    }
}
