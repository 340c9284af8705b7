//! Instrument Details
//!
//! Loads history and reference data for one instrument through the
//! [`MarketDataCollaborator`] port. Failures become a value the host can
//! show; they never touch the live stream.

use std::sync::Arc;

use serde::Serialize;

use crate::application::ports::{CollaboratorFetchError, MarketDataCollaborator};
use crate::domain::instrument::{AssetInfo, HistoricalPoint};

/// Everything needed to render one instrument's detail panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentDetails {
    /// Symbol.
    pub symbol: String,
    /// Reference data.
    pub asset: AssetInfo,
    /// Intraday bars, oldest first.
    pub history: Vec<HistoricalPoint>,
}

/// Outcome of a detail load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetailState {
    /// Both lookups succeeded.
    Ready(InstrumentDetails),
    /// At least one lookup failed.
    Unavailable {
        /// User-facing explanation.
        message: String,
    },
}

/// Fetches instrument details.
#[derive(Clone)]
pub struct DetailService {
    collaborator: Arc<dyn MarketDataCollaborator>,
}

impl std::fmt::Debug for DetailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailService").finish_non_exhaustive()
    }
}

impl DetailService {
    /// Create a service over a collaborator.
    #[must_use]
    pub fn new(collaborator: Arc<dyn MarketDataCollaborator>) -> Self {
        Self { collaborator }
    }

    /// Fetch history and asset data concurrently.
    pub async fn load(&self, symbol: &str) -> DetailState {
        let (history, asset) = tokio::join!(
            self.collaborator.historical(symbol),
            self.collaborator.asset(symbol),
        );

        match (history, asset) {
            (Ok(history), Ok(asset)) => {
                tracing::debug!(symbol, bars = history.len(), "Loaded instrument details");
                DetailState::Ready(InstrumentDetails {
                    symbol: symbol.to_string(),
                    asset,
                    history,
                })
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(symbol, error = %e, "Instrument details unavailable");
                DetailState::Unavailable {
                    message: unavailable_message(symbol, &e),
                }
            }
        }
    }
}

fn unavailable_message(symbol: &str, error: &CollaboratorFetchError) -> String {
    match error {
        CollaboratorFetchError::InvalidSymbol { .. } => {
            format!("{symbol} is not a supported symbol")
        }
        CollaboratorFetchError::Upstream { message } => {
            format!("No data available for {symbol}: {message}")
        }
        other => format!("Failed to load data for {symbol}: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::application::ports::MockMarketDataCollaborator;

    fn bar(price: f64) -> HistoricalPoint {
        HistoricalPoint {
            timestamp: DateTime::parse_from_rfc3339("2024-01-15T09:30:00-05:00").unwrap(),
            price,
            volume: 100,
        }
    }

    fn asset() -> AssetInfo {
        AssetInfo {
            symbol: Some("AAPL".to_string()),
            name: "Apple Inc.".to_string(),
            exchange: "NASDAQ".to_string(),
            status: Some("active".to_string()),
            tradable: true,
        }
    }

    #[tokio::test]
    async fn ready_when_both_succeed() {
        let mut mock = MockMarketDataCollaborator::new();
        mock.expect_historical().times(1).returning(|symbol| {
            assert_eq!(symbol, "AAPL");
            Ok(vec![bar(187.0), bar(187.5)])
        });
        mock.expect_asset().times(1).returning(|_| Ok(asset()));

        let state = DetailService::new(Arc::new(mock)).load("AAPL").await;
        let DetailState::Ready(details) = state else {
            panic!("expected ready, got {state:?}");
        };
        assert_eq!(details.history.len(), 2);
        assert_eq!(details.asset.name, "Apple Inc.");
    }

    #[tokio::test]
    async fn unavailable_when_history_fails() {
        let mut mock = MockMarketDataCollaborator::new();
        mock.expect_historical().returning(|_| {
            Err(CollaboratorFetchError::Upstream {
                message: "no bars".to_string(),
            })
        });
        mock.expect_asset().returning(|_| Ok(asset()));

        let state = DetailService::new(Arc::new(mock)).load("AAPL").await;
        assert_eq!(
            state,
            DetailState::Unavailable {
                message: "No data available for AAPL: no bars".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unavailable_when_asset_fails() {
        let mut mock = MockMarketDataCollaborator::new();
        mock.expect_historical().returning(|_| Ok(vec![bar(1.0)]));
        mock.expect_asset()
            .returning(|_| Err(CollaboratorFetchError::Status { status: 503 }));

        let state = DetailService::new(Arc::new(mock)).load("AAPL").await;
        let DetailState::Unavailable { message } = state else {
            panic!("expected unavailable");
        };
        assert!(message.contains("HTTP 503"));
    }

    #[test]
    fn detail_state_serializes_with_tag() {
        let json = serde_json::to_value(DetailState::Unavailable {
            message: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "unavailable");
    }
}
