//! Heartbeat
//!
//! Detects a dead connection that never closes. After `ping_interval` of
//! silence the session sends a ping; if nothing at all arrives within
//! `pong_timeout` of that ping, the connection is treated as failed.
//! Any inbound message counts as a sign of life.

use std::time::Duration;

use tokio::time::Instant;

use crate::infrastructure::config::StreamSettings;

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Silence before a ping is sent. Zero disables the heartbeat.
    pub ping_interval: Duration,
    /// Time allowed for any reply after a ping.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Build the heartbeat from stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }

    /// Check whether pings are sent at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }
}

/// What the session should do when the heartbeat deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due yet.
    Idle,
    /// Send a ping now.
    SendPing,
    /// The ping went unanswered; the connection is dead.
    TimedOut,
}

/// Liveness tracker for one connection.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

impl Heartbeat {
    /// Start tracking at `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            ping_sent_at: None,
        }
    }

    /// Check whether pings are sent at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Something arrived from the peer.
    pub const fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.ping_sent_at = None;
    }

    /// When [`Heartbeat::poll`] next has something to do.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.ping_sent_at.map_or_else(
            || self.last_activity + self.config.ping_interval,
            |sent| sent + self.config.pong_timeout,
        )
    }

    /// Decide what is due at `now`. Returning `SendPing` starts the pong
    /// timer.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if !self.is_enabled() || now < self.deadline() {
            return HeartbeatAction::Idle;
        }
        if self.ping_sent_at.is_some() {
            return HeartbeatAction::TimedOut;
        }
        self.ping_sent_at = Some(now);
        HeartbeatAction::SendPing
    }
}
