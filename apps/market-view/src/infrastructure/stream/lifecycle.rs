//! Connection Lifecycle
//!
//! The synchronous part of the transport: which [`ConnectionState`] is
//! active and how long to wait before the next attempt.
//!
//! ```text
//! connecting -> connected -> disconnected -> connecting -> ...
//!      \            \
//!       +-> error ---+-> disconnected
//! ```
//!
//! A failed attempt or a broken connection passes through `error` before
//! `disconnected`. A clean close by the server goes straight to
//! `disconnected`. Either way a retry is scheduled from `disconnected`.

use std::time::Duration;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::connection::ConnectionState;

/// State plus backoff for one transport session.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl ConnectionLifecycle {
    /// Start disconnected with a fresh backoff.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy: ReconnectPolicy::new(config),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retries since the last successful connect.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.policy.attempt_count()
    }

    /// An attempt is starting.
    pub const fn connecting(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connecting;
        self.state
    }

    /// The handshake succeeded; the retry count goes back to zero.
    pub const fn connected(&mut self) -> ConnectionState {
        self.policy.reset();
        self.state = ConnectionState::Connected;
        self.state
    }

    /// The attempt or the live connection failed.
    pub const fn failed(&mut self) -> ConnectionState {
        self.state = ConnectionState::Error;
        self.state
    }

    /// The connection is gone; returns the delay before the next attempt,
    /// or `None` when the attempt budget is spent.
    pub fn lost(&mut self) -> Option<Duration> {
        self.state = ConnectionState::Disconnected;
        self.policy.next_delay()
    }

    /// Closed on request; no retry follows.
    pub const fn closed(&mut self) -> ConnectionState {
        self.state = ConnectionState::Disconnected;
        self.state
    }
}
