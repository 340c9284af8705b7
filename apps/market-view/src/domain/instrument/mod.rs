//! Instrument Detail Types
//!
//! Shapes returned by the historical and asset collaborator endpoints. The
//! live stream never depends on them.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One intraday bar from `GET /api/historical/{symbol}`.
///
/// # Wire Format (JSON)
/// ```json
/// {"timestamp": "2024-01-15T09:30:00-05:00", "price": 187.42, "volume": 1200}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    /// Bar time, exchange local.
    pub timestamp: DateTime<FixedOffset>,
    /// Closing price.
    pub price: f64,
    /// Bar volume.
    #[serde(default)]
    pub volume: u64,
}

/// Envelope of the historical endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoricalResponse {
    /// Whether the upstream fetch worked.
    pub success: bool,
    /// Bars, oldest first.
    #[serde(default)]
    pub data: Vec<HistoricalPoint>,
    /// Upstream failure description.
    #[serde(default)]
    pub error: Option<String>,
}

/// Reference data from `GET /api/asset/{symbol}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Symbol, when echoed back.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Company name.
    pub name: String,
    /// Listing exchange.
    pub exchange: String,
    /// Asset status, when provided.
    #[serde(default)]
    pub status: Option<String>,
    /// Whether the asset is tradable.
    #[serde(default)]
    pub tradable: bool,
}

impl AssetInfo {
    /// Placeholder returned when the asset is not known upstream.
    #[must_use]
    pub fn unknown(symbol: &str) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            name: "Unknown".to_string(),
            exchange: "Unknown".to_string(),
            status: Some("unknown".to_string()),
            tradable: false,
        }
    }
}
