//! HTTP Collaborator Client
//!
//! `reqwest` adapter for the [`MarketDataCollaborator`] port.
//!
//! # Endpoints
//!
//! - `GET {base}/api/historical/{symbol}` -> `{success, data, error?}`
//! - `GET {base}/api/asset/{symbol}` -> `{name, exchange, ...}`
//!
//! Symbols are checked before any request is made. A 404 from the asset
//! endpoint means the asset is unknown upstream and yields a placeholder
//! rather than an error.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::ports::{CollaboratorFetchError, MarketDataCollaborator};
use crate::domain::instrument::{AssetInfo, HistoricalPoint, HistoricalResponse};
use crate::domain::snapshot::is_valid_symbol;
use crate::infrastructure::config::ApiSettings;

/// HTTP client for the historical and asset endpoints.
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: Client,
    base_url: String,
}

impl HttpCollaborator {
    /// Create a client from settings.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorFetchError::Network` if the HTTP client cannot
    /// be built.
    pub fn new(settings: &ApiSettings) -> Result<Self, CollaboratorFetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CollaboratorFetchError::Network {
                message: e.to_string(),
            })?;

        Ok(Self::with_client(client, &settings.base_url))
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn check_symbol(symbol: &str) -> Result<(), CollaboratorFetchError> {
        if is_valid_symbol(symbol) {
            Ok(())
        } else {
            Err(CollaboratorFetchError::InvalidSymbol {
                symbol: symbol.to_string(),
            })
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, CollaboratorFetchError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(url = %url, "Collaborator request");
        self.client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| CollaboratorFetchError::Network {
                message: e.to_string(),
            })
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CollaboratorFetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorFetchError::Status {
                status: status.as_u16(),
            });
        }
        let text = response
            .text()
            .await
            .map_err(|e| CollaboratorFetchError::Network {
                message: e.to_string(),
            })?;
        serde_json::from_str(&text).map_err(|e| CollaboratorFetchError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MarketDataCollaborator for HttpCollaborator {
    async fn historical(
        &self,
        symbol: &str,
    ) -> Result<Vec<HistoricalPoint>, CollaboratorFetchError> {
        Self::check_symbol(symbol)?;

        let response = self.get(&format!("/api/historical/{symbol}")).await?;
        let body: HistoricalResponse = Self::decode(response).await?;
        if !body.success {
            return Err(CollaboratorFetchError::Upstream {
                message: body
                    .error
                    .unwrap_or_else(|| "historical data unavailable".to_string()),
            });
        }

        tracing::debug!(symbol, points = body.data.len(), "Fetched historical data");
        Ok(body.data)
    }

    async fn asset(&self, symbol: &str) -> Result<AssetInfo, CollaboratorFetchError> {
        Self::check_symbol(symbol)?;

        let response = self.get(&format!("/api/asset/{symbol}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(symbol, "Asset not found upstream");
            return Ok(AssetInfo::unknown(symbol));
        }
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> HttpCollaborator {
        HttpCollaborator::new(&ApiSettings {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_historical_points() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/historical/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [
                    {"timestamp": "2024-01-15T09:30:00-05:00", "price": 187.42, "volume": 1200},
                    {"timestamp": "2024-01-15T09:31:00-05:00", "price": 187.55, "volume": 900}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let points = client_for(&server).historical("AAPL").await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].volume, 900);
    }

    #[tokio::test]
    async fn upstream_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/historical/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "no bars for today"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).historical("MSFT").await.unwrap_err();
        assert_eq!(
            err,
            CollaboratorFetchError::Upstream {
                message: "no bars for today".to_string()
            }
        );
    }

    #[tokio::test]
    async fn invalid_symbol_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        for symbol in ["aapl", "GOOGL", "TEST", "BRK.B"] {
            assert!(matches!(
                client.asset(symbol).await,
                Err(CollaboratorFetchError::InvalidSymbol { .. })
            ));
        }
    }

    #[tokio::test]
    async fn asset_not_found_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/asset/ZZZZ"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let asset = client_for(&server).asset("ZZZZ").await.unwrap();
        assert_eq!(asset, AssetInfo::unknown("ZZZZ"));
    }

    #[tokio::test]
    async fn asset_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/asset/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "AAPL",
                "name": "Apple Inc.",
                "exchange": "NASDAQ",
                "status": "active",
                "tradable": true
            })))
            .mount(&server)
            .await;

        let asset = client_for(&server).asset("AAPL").await.unwrap();
        assert_eq!(asset.exchange, "NASDAQ");
        assert!(asset.tradable);
    }

    #[tokio::test]
    async fn server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).asset("AAPL").await.unwrap_err();
        assert_eq!(err, CollaboratorFetchError::Status { status: 500 });
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).historical("AAPL").await.unwrap_err();
        assert!(matches!(err, CollaboratorFetchError::Decode { .. }));
    }
}
