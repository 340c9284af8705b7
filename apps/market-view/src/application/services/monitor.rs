//! Market Monitor
//!
//! The host-facing surface. Owns the [`MarketView`] and the
//! [`TransportManager`] and applies transport events to the view one at a
//! time.
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn run() {
//! use market_view::application::services::{MarketMonitor, MarketView, MonitorEvent};
//! use market_view::infrastructure::stream::TransportConfig;
//!
//! let mut monitor = MarketMonitor::new(TransportConfig::default(), 1024, MarketView::default());
//! monitor.connect("ws://localhost:8000/ws");
//!
//! while let Some(event) = monitor.next_change().await {
//!     if let MonitorEvent::ViewUpdated { revision } = event {
//!         println!("revision {revision}: {} rows", monitor.view().visible().len());
//!     }
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::market_view::MarketView;
use crate::domain::connection::ConnectionState;
use crate::domain::view::{ConfigError, FilterUpdate, SortConfig, SortKey};
use crate::infrastructure::metrics;
use crate::infrastructure::stream::{
    JsonCodec, StreamEvent, TransportConfig, TransportEvent, TransportEventKind,
    TransportManager,
};

/// Something the host may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The transport changed state.
    ConnectionChanged(ConnectionState),
    /// A new generation was applied and the view recomputed.
    ViewUpdated {
        /// Revision after the recompute.
        revision: u64,
    },
    /// The broadcaster sent a market status payload.
    MarketStatus(serde_json::Value),
    /// The broadcaster reported an error.
    UpstreamError(String),
}

/// Point-in-time summary for health reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Transport state.
    pub connection: ConnectionState,
    /// Instruments in the current generation.
    pub instruments: usize,
    /// Rows in the visible view.
    pub visible: usize,
    /// View revision.
    pub revision: u64,
    /// Broadcaster time of the last applied generation.
    pub last_update: Option<DateTime<Utc>>,
    /// Whether the broadcaster's own feed is connected.
    pub upstream_connected: Option<bool>,
    /// Frames dropped by the codec since start.
    pub frames_rejected: u64,
}

/// Drives a [`MarketView`] from the market stream.
#[derive(Debug)]
pub struct MarketMonitor {
    view: MarketView,
    transport: TransportManager,
    events: mpsc::Receiver<TransportEvent>,
    codec: JsonCodec,
    status: watch::Sender<MonitorStatus>,
    frames_rejected: u64,
}

impl MarketMonitor {
    /// Create a disconnected monitor.
    #[must_use]
    pub fn new(transport: TransportConfig, event_buffer: usize, view: MarketView) -> Self {
        let (event_tx, events) = mpsc::channel(event_buffer.max(1));
        let (status, _) = watch::channel(MonitorStatus::default());
        let monitor = Self {
            view,
            transport: TransportManager::new(transport, event_tx),
            events,
            codec: JsonCodec::new(),
            status,
            frames_rejected: 0,
        };
        monitor.publish();
        monitor
    }

    // =========================================================================
    // Host Commands
    // =========================================================================

    /// Connect to `url`, replacing any existing connection.
    pub fn connect(&mut self, url: &str) -> Uuid {
        let session = self.transport.open(url);
        self.view.set_connection_state(ConnectionState::Connecting);
        self.publish();
        session
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&mut self) {
        self.transport.close().await;
        self.view.set_connection_state(ConnectionState::Disconnected);
        self.publish();
    }

    /// Apply a partial filter change.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the update is rejected; the previous
    /// filter stays in effect.
    pub fn set_filter_config(&mut self, update: &FilterUpdate) -> Result<(), ConfigError> {
        if let Err(e) = self.view.set_filter_config(update) {
            tracing::warn!(error = %e, "Rejected filter update");
            return Err(e);
        }
        self.publish();
        Ok(())
    }

    /// Select a sort column. Same key toggles direction; a new key starts
    /// ascending.
    pub fn set_sort_config(&mut self, key: SortKey) -> SortConfig {
        let sort = self.view.set_sort_config(key);
        self.publish();
        sort
    }

    /// Send a text payload if connected.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        self.transport.send(payload)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// The current view.
    #[must_use]
    pub const fn view(&self) -> &MarketView {
        &self.view
    }

    /// Transport state as seen by `send`.
    #[must_use]
    pub fn transport_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Watch channel with the latest status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<MonitorStatus> {
        self.status.subscribe()
    }

    /// Frames dropped so far.
    #[must_use]
    pub const fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Wait for the next event that changes what the host sees.
    ///
    /// Malformed frames and events from replaced sessions are absorbed
    /// here. Cancel-safe: an event is either fully applied or still queued.
    pub async fn next_change(&mut self) -> Option<MonitorEvent> {
        loop {
            let event = self.events.recv().await?;
            if let Some(change) = self.handle(event) {
                self.publish();
                return Some(change);
            }
        }
    }

    fn handle(&mut self, event: TransportEvent) -> Option<MonitorEvent> {
        if !self.transport.is_current(event.session) {
            tracing::debug!(session = %event.session, "Ignoring event from stale session");
            return None;
        }

        match event.kind {
            TransportEventKind::State(state) => self
                .view
                .set_connection_state(state)
                .then_some(MonitorEvent::ConnectionChanged(state)),
            TransportEventKind::Frame(text) => self.handle_frame(&text),
        }
    }

    fn handle_frame(&mut self, text: &str) -> Option<MonitorEvent> {
        let decoded = match self.codec.decode(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, reason = e.reason(), "Dropping malformed frame");
                metrics::record_rejected(e.reason());
                self.frames_rejected += 1;
                self.publish();
                return None;
            }
        };
        metrics::record_frame(decoded.kind());

        match decoded {
            StreamEvent::MarketData(frame) => {
                self.view.apply_frame(frame);
                Some(MonitorEvent::ViewUpdated {
                    revision: self.view.revision(),
                })
            }
            StreamEvent::MarketStatus(status) => {
                tracing::info!(status = %status, "Market status update");
                self.view.record_market_status(status.clone());
                Some(MonitorEvent::MarketStatus(status))
            }
            StreamEvent::Error(message) => {
                tracing::warn!(message = %message, "Upstream reported an error");
                self.view.record_upstream_error(message.clone());
                Some(MonitorEvent::UpstreamError(message))
            }
        }
    }

    fn publish(&self) {
        let upstream = self.view.upstream();
        let status = MonitorStatus {
            connection: self.view.connection_state(),
            instruments: self.view.instrument_count(),
            visible: self.view.visible().len(),
            revision: self.view.revision(),
            last_update: upstream.last_update,
            upstream_connected: upstream.upstream_connected,
            frames_rejected: self.frames_rejected,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{"type":"market_data","data":[
        {"symbol":"AAA","current_price":10,"percent_change":5,"volume":100,"trade_count":1,"high":10,"low":10,"vwap":10,"std_dev":0},
        {"symbol":"BBB","current_price":20,"percent_change":-3,"volume":400,"trade_count":1,"high":20,"low":20,"vwap":20,"std_dev":0}
    ],"proxy_connected":true}"#;

    fn monitor() -> MarketMonitor {
        MarketMonitor::new(TransportConfig::default(), 16, MarketView::default())
    }

    fn frame(session: Uuid, text: &str) -> TransportEvent {
        TransportEvent {
            session,
            kind: TransportEventKind::Frame(text.to_string()),
        }
    }

    #[tokio::test]
    async fn events_without_session_are_ignored() {
        let mut monitor = monitor();
        assert!(monitor.handle(frame(Uuid::new_v4(), FRAME)).is_none());
        assert_eq!(monitor.view().revision(), 0);
    }

    #[tokio::test]
    async fn frame_from_current_session_updates_view() {
        let mut monitor = monitor();
        let session = monitor.connect("ws://127.0.0.1:1/ws");

        let change = monitor.handle(frame(session, FRAME));
        assert_eq!(change, Some(MonitorEvent::ViewUpdated { revision: 1 }));
        assert_eq!(monitor.view().visible()[0].symbol, "BBB");
        assert_eq!(monitor.view().upstream().upstream_connected, Some(true));
        monitor.disconnect().await;
    }

    #[tokio::test]
    async fn malformed_frame_changes_nothing() {
        let mut monitor = monitor();
        let session = monitor.connect("ws://127.0.0.1:1/ws");
        monitor.handle(frame(session, FRAME));
        let state = monitor.view().connection_state();

        assert!(monitor.handle(frame(session, "{not json")).is_none());
        assert!(monitor.handle(frame(session, r#"{"type":"nope","data":1}"#)).is_none());

        assert_eq!(monitor.frames_rejected(), 2);
        assert_eq!(monitor.view().revision(), 1);
        assert_eq!(monitor.view().instrument_count(), 2);
        assert_eq!(monitor.view().connection_state(), state);
        assert_eq!(monitor.status().borrow().frames_rejected, 2);
        monitor.disconnect().await;
    }

    #[tokio::test]
    async fn stale_session_is_ignored_after_reconnect() {
        let mut monitor = monitor();
        let old = monitor.connect("ws://127.0.0.1:1/a");
        let _new = monitor.connect("ws://127.0.0.1:1/b");

        assert!(monitor.handle(frame(old, FRAME)).is_none());
        assert_eq!(monitor.view().instrument_count(), 0);
        monitor.disconnect().await;
    }

    #[tokio::test]
    async fn status_and_error_frames_surface() {
        let mut monitor = monitor();
        let session = monitor.connect("ws://127.0.0.1:1/ws");

        let status = monitor.handle(frame(
            session,
            r#"{"type":"market_status","data":{"is_open":true}}"#,
        ));
        assert!(matches!(status, Some(MonitorEvent::MarketStatus(_))));

        let error = monitor.handle(frame(session, r#"{"type":"error","data":"stale feed"}"#));
        assert_eq!(error, Some(MonitorEvent::UpstreamError("stale feed".to_string())));
        assert_eq!(monitor.view().upstream().last_error.as_deref(), Some("stale feed"));
        monitor.disconnect().await;
    }

    #[tokio::test]
    async fn repeated_state_is_not_a_change() {
        let mut monitor = monitor();
        let session = monitor.connect("ws://127.0.0.1:1/ws");
        let event = |state| TransportEvent {
            session,
            kind: TransportEventKind::State(state),
        };

        assert!(monitor.handle(event(ConnectionState::Connecting)).is_none());
        assert_eq!(
            monitor.handle(event(ConnectionState::Error)),
            Some(MonitorEvent::ConnectionChanged(ConnectionState::Error))
        );
        monitor.disconnect().await;
        assert_eq!(monitor.status().borrow().connection, ConnectionState::Disconnected);
    }

    #[test]
    fn filter_and_sort_publish_status() {
        let mut monitor = monitor();
        monitor.view.replace_snapshots(Vec::new());
        let rx = monitor.status();

        monitor
            .set_filter_config(&FilterUpdate {
                display_count: Some(10),
                ..FilterUpdate::default()
            })
            .unwrap();
        monitor.set_sort_config(SortKey::Symbol);

        assert_eq!(rx.borrow().revision, 3);
        assert!(monitor
            .set_filter_config(&FilterUpdate {
                display_count: Some(7),
                ..FilterUpdate::default()
            })
            .is_err());
        assert_eq!(monitor.view().revision(), 3);
    }
}
