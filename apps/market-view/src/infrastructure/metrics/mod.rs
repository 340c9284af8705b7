//! Prometheus Metrics
//!
//! Counters and gauges for the ingestion pipeline, rendered at `/metrics`
//! by the health server.
//!
//! # Series
//!
//! - `market_view_frames_received_total{kind}`: decoded frames by type
//! - `market_view_frames_rejected_total{reason}`: frames dropped by the codec
//! - `market_view_reconnects_total`: scheduled reconnects
//! - `market_view_connection_state`: 0 disconnected, 1 connecting,
//!   2 connected, 3 error
//! - `market_view_instruments`: size of the current snapshot set
//! - `market_view_recompute_seconds`: time spent in one recompute
//!
//! Recording before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once and return its handle.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
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

/// Handle for rendering, `None` before [`init_metrics`].
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "market_view_frames_received_total",
        "Decoded frames from the market stream by type"
    );
    describe_counter!(
        "market_view_frames_rejected_total",
        "Frames dropped because they failed to decode or validate"
    );
    describe_counter!(
        "market_view_reconnects_total",
        "Reconnect attempts scheduled after a lost connection"
    );
    describe_gauge!(
        "market_view_connection_state",
        "Stream connection state (0 disconnected, 1 connecting, 2 connected, 3 error)"
    );
    describe_gauge!(
        "market_view_instruments",
        "Instruments in the current snapshot set"
    );
    describe_histogram!(
        "market_view_recompute_seconds",
        "Time to recompute the visible view"
    );
}

/// Record a decoded frame.
pub fn record_frame(kind: &'static str) {
    counter!("market_view_frames_received_total", "kind" => kind).increment(1);
}

/// Record a rejected frame.
pub fn record_rejected(reason: &'static str) {
    counter!("market_view_frames_rejected_total", "reason" => reason).increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("market_view_reconnects_total").increment(1);
}

/// Publish the current connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("market_view_connection_state").set(f64::from(state.code()));
}

/// Publish the snapshot set size.
#[allow(clippy::cast_precision_loss)]
pub fn set_instruments(count: usize) {
    gauge!("market_view_instruments").set(count as f64);
}

/// Record one recompute.
pub fn record_recompute(duration: Duration) {
    histogram!("market_view_recompute_seconds").record(duration.as_secs_f64());
}
