//! Stream Messages
//!
//! Decoded form of the upstream broadcaster's frames.
//!
//! # Envelope (JSON)
//!
//! ```json
//! {
//!   "type": "market_data",
//!   "data": [{"symbol": "AAPL", "current_price": 187.42, ...}],
//!   "timestamp": "2024-01-15T14:30:00.123456",
//!   "proxy_connected": true
//! }
//! ```
//!
//! `type` is one of `market_data`, `market_status` or `error`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::snapshot::InstrumentSnapshot;

/// Wire discriminant of a market data frame.
pub const MARKET_DATA: &str = "market_data";
/// Wire discriminant of a market status frame.
pub const MARKET_STATUS: &str = "market_status";
/// Wire discriminant of an upstream error frame.
pub const ERROR: &str = "error";

/// Raw envelope before dispatch on `type`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub proxy_connected: Option<bool>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Full replacement of the snapshot set.
    MarketData(MarketDataFrame),
    /// Opaque market status payload.
    MarketStatus(serde_json::Value),
    /// Error reported by the upstream broadcaster.
    Error(String),
}

impl StreamEvent {
    /// Wire discriminant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MarketData(_) => MARKET_DATA,
            Self::MarketStatus(_) => MARKET_STATUS,
            Self::Error(_) => ERROR,
        }
    }
}

/// Payload of a `market_data` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataFrame {
    /// Validated snapshots in upstream order.
    pub snapshots: Vec<InstrumentSnapshot>,
    /// Broadcaster time, when present and parsable.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the broadcaster's own upstream feed is connected.
    pub upstream_connected: Option<bool>,
}

/// Body of an `error` frame given as an object.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
