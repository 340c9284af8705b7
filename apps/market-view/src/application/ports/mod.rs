//! Port Interfaces
//!
//! Outbound contracts the application layer depends on. Infrastructure
//! adapters implement them.
//!
//! - [`MarketDataCollaborator`]: historical bars and asset reference data
//!   for one instrument, served over HTTP by the upstream broadcaster

use async_trait::async_trait;

use crate::domain::instrument::{AssetInfo, HistoricalPoint};

/// Failure of a collaborator request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorFetchError {
    /// Symbol is not a plain listed ticker; no request was made.
    #[error("invalid symbol: {symbol}")]
    InvalidSymbol {
        /// Rejected symbol.
        symbol: String,
    },

    /// Request did not complete.
    #[error("collaborator request failed: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("collaborator returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Body did not match the expected shape.
    #[error("collaborator response could not be decoded: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Upstream answered with `success: false`.
    #[error("upstream error: {message}")]
    Upstream {
        /// Error details.
        message: String,
    },
}

/// Instrument detail lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataCollaborator: Send + Sync {
    /// Intraday history for `symbol`, oldest first.
    async fn historical(&self, symbol: &str)
    -> Result<Vec<HistoricalPoint>, CollaboratorFetchError>;

    /// Reference data for `symbol`.
    async fn asset(&self, symbol: &str) -> Result<AssetInfo, CollaboratorFetchError>;
}
