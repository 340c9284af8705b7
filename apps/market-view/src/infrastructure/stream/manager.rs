//! Transport Manager
//!
//! Owns the WebSocket session to the market stream and keeps it alive.
//!
//! # Sessions
//!
//! Every [`TransportManager::open`] starts a new session with its own id,
//! cancellation token and task. The task connects, forwards text frames,
//! and on loss waits out the backoff before reconnecting. Every event it
//! emits carries the session id, so a consumer can ignore anything from a
//! session that has since been replaced or closed.
//!
//! # Liveness
//!
//! A connected session pings the server after a quiet period and fails the
//! connection when no reply arrives in time (see [`HeartbeatConfig`]). A
//! peer that vanished without closing the socket is therefore retried like
//! any other loss.
//!
//! # Outbound
//!
//! [`TransportManager::send`] only hands a payload to the socket while the
//! session is connected, through a bounded queue; a payload that does not fit
//! is dropped. Payloads still queued when the connection drops are discarded
//! on the next connect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use super::lifecycle::ConnectionLifecycle;
use super::reconnect::ReconnectConfig;
use crate::domain::connection::ConnectionState;
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake when a session is cancelled.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Configuration
// =============================================================================

/// Settings for every session a manager opens.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Backoff between connection attempts.
    pub reconnect: ReconnectConfig,
    /// Liveness check on a connected socket.
    pub heartbeat: HeartbeatConfig,
    /// Outbound payloads that may wait for the socket.
    pub outbound_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            outbound_buffer: 64,
        }
    }
}

impl TransportConfig {
    /// Build the transport settings from stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_stream_settings(settings),
            heartbeat: HeartbeatConfig::from_stream_settings(settings),
            outbound_buffer: settings.outbound_buffer,
        }
    }
}

// =============================================================================
// Errors and Events
// =============================================================================

/// Failure of a single connection. Absorbed by the reconnect loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The handshake did not complete.
    #[error("WebSocket connect failed: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    /// The live connection broke.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server stopped answering.
    #[error("no reply to heartbeat within {0:?}")]
    HeartbeatTimeout(Duration),
}

/// Event emitted by a session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Session that produced the event.
    pub session: Uuid,
    /// What happened.
    pub kind: TransportEventKind,
}

/// Payload of a [`TransportEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The session moved to a new state.
    State(ConnectionState),
    /// A text frame arrived.
    Frame(String),
}

// =============================================================================
// Manager
// =============================================================================

struct Session {
    id: Uuid,
    cancel: CancellationToken,
    state: Arc<RwLock<ConnectionState>>,
    outbound: mpsc::Sender<String>,
    handle: JoinHandle<()>,
}

/// Owns at most one live session.
pub struct TransportManager {
    config: TransportConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    session: Option<Session>,
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("session", &self.current_session())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TransportManager {
    /// Create a manager that reports on `event_tx`.
    #[must_use]
    pub const fn new(config: TransportConfig, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            event_tx,
            session: None,
        }
    }

    /// Start a session to `url`, replacing any live one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&mut self, url: impl Into<String>) -> Uuid {
        if let Some(previous) = self.session.take() {
            tracing::debug!(session = %previous.id, "Replacing transport session");
            previous.cancel.cancel();
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let (outbound, outbound_rx) = mpsc::channel(self.config.outbound_buffer.max(1));

        let task = SessionTask {
            id,
            url: url.into(),
            lifecycle: ConnectionLifecycle::new(self.config.reconnect.clone()),
            heartbeat: self.config.heartbeat.clone(),
            state: Arc::clone(&state),
            event_tx: self.event_tx.clone(),
            outbound_rx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        self.session = Some(Session {
            id,
            cancel,
            state,
            outbound,
            handle,
        });
        id
    }

    /// Hand a text payload to the live socket.
    ///
    /// Returns `false` without queueing anything unless connected, and when
    /// the outbound queue is full.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        if !session.state.read().is_connected() {
            return false;
        }
        offer(&session.outbound, payload.into())
    }

    /// Cancel any pending retry and close the connection. Idempotent.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.handle.await
            && !e.is_cancelled()
        {
            tracing::warn!(session = %session.id, error = %e, "Transport session task failed");
        }
        tracing::info!(session = %session.id, "Transport closed");
    }

    /// State of the live session, `Disconnected` when there is none.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| *s.state.read())
    }

    /// Id of the live session.
    #[must_use]
    pub fn current_session(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Check whether `session` is the live session.
    #[must_use]
    pub fn is_current(&self, session: Uuid) -> bool {
        self.current_session() == Some(session)
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

/// Queue a payload without waiting. A full queue drops it.
fn offer(outbound: &mpsc::Sender<String>, payload: String) -> bool {
    match outbound.try_send(payload) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("Outbound queue full, dropping payload");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// =============================================================================
// Session Task
// =============================================================================

enum SessionEnd {
    Cancelled,
    ClosedByServer,
    Failed(TransportError),
}

struct SessionTask {
    id: Uuid,
    url: String,
    lifecycle: ConnectionLifecycle,
    heartbeat: HeartbeatConfig,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::Sender<TransportEvent>,
    outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(mut self) {
        self.drive().await;

        let closed = self.lifecycle.closed();
        *self.state.write() = closed;
        metrics::set_connection_state(closed);
        tracing::debug!(session = %self.id, "Transport session ended");
    }

    /// Connect, pump and retry until cancelled or out of attempts.
    async fn drive(&mut self) {
        loop {
            self.lifecycle.connecting();
            if !self.publish_state().await {
                return;
            }
            tracing::info!(session = %self.id, url = %self.url, "Connecting to market stream");

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };

            let end = match attempt {
                Ok((ws, _response)) => {
                    while self.outbound_rx.try_recv().is_ok() {}
                    self.lifecycle.connected();
                    if !self.publish_state().await {
                        return;
                    }
                    tracing::info!(session = %self.id, "Market stream connected");
                    self.pump(ws).await
                }
                Err(e) => SessionEnd::Failed(TransportError::Connect(e)),
            };

            match end {
                SessionEnd::Cancelled => return,
                SessionEnd::ClosedByServer => {
                    tracing::info!(session = %self.id, "Market stream closed by server");
                }
                SessionEnd::Failed(e) => {
                    tracing::warn!(session = %self.id, error = %e, "Market stream connection error");
                    self.lifecycle.failed();
                    if !self.publish_state().await {
                        return;
                    }
                }
            }

            let next = self.lifecycle.lost();
            if !self.publish_state().await {
                return;
            }
            let Some(delay) = next else {
                tracing::error!(
                    session = %self.id,
                    attempts = self.lifecycle.retry_count(),
                    "Reconnect attempts exhausted, giving up"
                );
                return;
            };
            if !self.wait(delay).await {
                return;
            }
        }
    }

    /// Read and write until the connection ends or the session is cancelled.
    async fn pump(&mut self, ws: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws.split();
        let mut heartbeat = Heartbeat::new(self.heartbeat.clone(), Instant::now());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await.is_err() {
                        tracing::debug!(session = %self.id, "Close handshake timed out");
                    }
                    return SessionEnd::Cancelled;
                }
                () = tokio::time::sleep_until(heartbeat.deadline()), if heartbeat.is_enabled() => {
                    match heartbeat.poll(Instant::now()) {
                        HeartbeatAction::Idle => {}
                        HeartbeatAction::SendPing => {
                            let ping = write.send(Message::Ping(Vec::new().into()));
                            match timeout(self.heartbeat.pong_timeout, ping).await {
                                Ok(Ok(())) => tracing::trace!(session = %self.id, "Heartbeat ping sent"),
                                Ok(Err(e)) => return SessionEnd::Failed(e.into()),
                                Err(_) => return self.heartbeat_timeout(),
                            }
                        }
                        HeartbeatAction::TimedOut => return self.heartbeat_timeout(),
                    }
                }
                Some(payload) = self.outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(payload.into())).await {
                        return SessionEnd::Failed(e.into());
                    }
                }
                msg = read.next() => {
                    if matches!(msg, Some(Ok(_))) {
                        heartbeat.record_activity(Instant::now());
                    }
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame = TransportEventKind::Frame(text.as_str().to_owned());
                            if !self.emit(frame).await {
                                return SessionEnd::Cancelled;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return SessionEnd::Failed(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return SessionEnd::ClosedByServer,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return SessionEnd::Failed(e.into()),
                    }
                }
            }
        }
    }

    fn heartbeat_timeout(&self) -> SessionEnd {
        tracing::warn!(session = %self.id, "Heartbeat timeout");
        SessionEnd::Failed(TransportError::HeartbeatTimeout(self.heartbeat.pong_timeout))
    }

    /// Sleep out the backoff. Returns `false` if cancelled meanwhile.
    async fn wait(&self, delay: Duration) -> bool {
        let attempt = self.lifecycle.retry_count();
        tracing::info!(
            session = %self.id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting to market stream"
        );
        metrics::record_reconnect();

        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Mirror the lifecycle state to `send` and the consumer.
    async fn publish_state(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let state = self.lifecycle.state();
        *self.state.write() = state;
        metrics::set_connection_state(state);
        self.emit(TransportEventKind::State(state)).await
    }

    /// Deliver an event unless the session is cancelled or the consumer
    /// is gone.
    async fn emit(&self, kind: TransportEventKind) -> bool {
        let event = TransportEvent {
            session: self.id,
            kind,
        };
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.event_tx.send(event) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_manager_is_disconnected() {
        let (tx, _rx) = mpsc::channel(8);
        let manager = TransportManager::new(TransportConfig::default(), tx);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.current_session().is_none());
        assert!(!manager.send("ping"));
    }

    #[tokio::test]
    async fn close_without_session_is_noop() {
        let (tx, _rx) = mpsc::channel(8);
        let mut manager = TransportManager::new(TransportConfig::default(), tx);
        manager.close().await;
        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_is_rejected_while_connecting() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut manager = TransportManager::new(TransportConfig::default(), tx);
        let session = manager.open("ws://127.0.0.1:1/unreachable");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.session, session);
        assert_eq!(first.kind, TransportEventKind::State(ConnectionState::Connecting));
        assert!(!manager.send("ping"));

        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_reports_error_then_disconnected() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut manager = TransportManager::new(
            TransportConfig {
                reconnect: ReconnectConfig {
                    initial_delay: Duration::from_secs(60),
                    ..ReconnectConfig::default()
                },
                ..TransportConfig::default()
            },
            tx,
        );
        manager.open("ws://127.0.0.1:1/unreachable");

        let states: Vec<_> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|e| e.unwrap().kind)
            .collect();
        assert_eq!(
            states,
            vec![
                TransportEventKind::State(ConnectionState::Connecting),
                TransportEventKind::State(ConnectionState::Error),
                TransportEventKind::State(ConnectionState::Disconnected),
            ]
        );

        // Sitting in the 60 s backoff; close must not wait for it.
        tokio::time::timeout(Duration::from_secs(5), manager.close())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reopen_replaces_session() {
        let (tx, _rx) = mpsc::channel(64);
        let mut manager = TransportManager::new(TransportConfig::default(), tx);
        let first = manager.open("ws://127.0.0.1:1/a");
        let second = manager.open("ws://127.0.0.1:1/b");

        assert_ne!(first, second);
        assert!(manager.is_current(second));
        assert!(!manager.is_current(first));
        manager.close().await;
        assert!(manager.current_session().is_none());
    }

    #[test]
    fn offer_drops_when_queue_is_full() {
        let (outbound, mut rx) = mpsc::channel(1);
        assert!(offer(&outbound, "first".to_string()));
        assert!(!offer(&outbound, "second".to_string()));

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
        assert!(offer(&outbound, "third".to_string()));
    }

    #[test]
    fn offer_to_closed_queue_fails() {
        let (outbound, rx) = mpsc::channel(4);
        drop(rx);
        assert!(!offer(&outbound, "late".to_string()));
    }

    #[test]
    fn transport_config_from_settings() {
        let settings = StreamSettings {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(3),
            outbound_buffer: 8,
            ..StreamSettings::default()
        };
        let config = TransportConfig::from_stream_settings(&settings);
        assert_eq!(
            config.heartbeat,
            HeartbeatConfig::new(Duration::from_secs(5), Duration::from_secs(3))
        );
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.reconnect.initial_delay, settings.reconnect_delay_initial);
    }
}
