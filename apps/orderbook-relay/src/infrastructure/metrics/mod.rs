//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Connections**: live relay connections
//! - **Pumps**: running update pumps and their fetch/push outcomes
//! - **Control plane**: subscribe/unsubscribe traffic and protocol errors
//! - **Latency**: upstream snapshot fetch duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!("relay_connections", "Number of open relay connections");
    describe_gauge!("relay_active_pumps", "Number of running update pumps");
    describe_gauge!(
        "relay_subscriptions",
        "Number of active (connection, symbol) subscriptions"
    );

    describe_counter!(
        "relay_snapshots_pushed_total",
        "Snapshots delivered to client connections"
    );
    describe_counter!(
        "relay_push_errors_total",
        "Snapshot pushes that failed because the connection was gone"
    );
    describe_counter!(
        "relay_fetch_errors_total",
        "Failed upstream snapshot fetches"
    );
    describe_counter!(
        "relay_control_messages_total",
        "Control messages received by action"
    );
    describe_counter!(
        "relay_protocol_errors_total",
        "Inbound frames that could not be parsed"
    );

    describe_histogram!(
        "relay_fetch_duration_seconds",
        "Upstream snapshot fetch latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Control message action label.
#[derive(Debug, Clone, Copy)]
pub enum ControlAction {
    /// Subscribe request.
    Subscribe,
    /// Unsubscribe request.
    Unsubscribe,
}

impl ControlAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// Record a newly opened connection.
pub fn connection_opened() {
    gauge!("relay_connections").increment(1.0);
}

/// Record a closed connection.
pub fn connection_closed() {
    gauge!("relay_connections").decrement(1.0);
}

/// Record a pump start.
pub fn pump_started() {
    gauge!("relay_active_pumps").increment(1.0);
}

/// Record a pump exit.
pub fn pump_stopped() {
    gauge!("relay_active_pumps").decrement(1.0);
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("relay_subscriptions").set(count as f64);
}

/// Record a delivered snapshot.
pub fn record_snapshot_pushed() {
    counter!("relay_snapshots_pushed_total").increment(1);
}

/// Record a failed push.
pub fn record_push_error() {
    counter!("relay_push_errors_total").increment(1);
}

/// Record a failed upstream fetch.
pub fn record_fetch_error() {
    counter!("relay_fetch_errors_total").increment(1);
}

/// Record a control message.
pub fn record_control_message(action: ControlAction) {
    counter!(
        "relay_control_messages_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Record an unparseable inbound frame.
pub fn record_protocol_error() {
    counter!("relay_protocol_errors_total").increment(1);
}

/// Record upstream fetch duration.
pub fn record_fetch_duration(duration: Duration) {
    histogram!("relay_fetch_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_action_as_str() {
        assert_eq!(ControlAction::Subscribe.as_str(), "subscribe");
        assert_eq!(ControlAction::Unsubscribe.as_str(), "unsubscribe");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        connection_opened();
        record_control_message(ControlAction::Subscribe);
        record_fetch_duration(Duration::from_millis(5));
        connection_closed();
    }
}
