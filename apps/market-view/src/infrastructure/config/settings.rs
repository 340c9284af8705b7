//! Monitor Settings
//!
//! Runtime configuration for the market view binary, loaded from
//! environment variables. Numeric variables that fail to parse fall back to
//! their defaults. URLs, view settings and the backoff and heartbeat timings
//! are validated: a value that parses but cannot drive the reconnect loop is
//! an error.

use std::time::Duration;

use crate::domain::view::{ConfigError, DisplayCount, SortKey};

/// Market stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// WebSocket URL of the upstream broadcaster.
    pub url: String,
    /// Delay before the first reconnect.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnect delay.
    pub reconnect_delay_max: Duration,
    /// Backoff growth factor.
    pub reconnect_delay_multiplier: f64,
    /// Backoff jitter fraction (0 = none).
    pub reconnect_jitter: f64,
    /// Reconnect attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Silence before a heartbeat ping (0 = no heartbeat).
    pub heartbeat_interval: Duration,
    /// Time allowed for a reply to a heartbeat ping.
    pub heartbeat_timeout: Duration,
    /// Capacity of the transport event channel.
    pub event_buffer: usize,
    /// Capacity of the outbound payload queue.
    pub outbound_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 0,
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(20),
            event_buffer: 1024,
            outbound_buffer: 64,
        }
    }
}

impl StreamSettings {
    /// Check that the backoff and heartbeat timings are usable.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for a zero delay, a multiplier
    /// below 1, a jitter outside `[0, 1]`, a non-finite factor, or a zero
    /// heartbeat timeout while the heartbeat is on.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.reconnect_delay_initial.is_zero() {
            return Err(SettingsError::invalid(
                "MARKET_VIEW_RECONNECT_DELAY_INITIAL_MS",
                "0",
            ));
        }
        if self.reconnect_delay_max.is_zero() {
            return Err(SettingsError::invalid(
                "MARKET_VIEW_RECONNECT_DELAY_MAX_SECS",
                "0",
            ));
        }
        let multiplier = self.reconnect_delay_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(SettingsError::invalid(
                "MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER",
                &multiplier.to_string(),
            ));
        }
        let jitter = self.reconnect_jitter;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(SettingsError::invalid(
                "MARKET_VIEW_RECONNECT_JITTER",
                &jitter.to_string(),
            ));
        }
        if !self.heartbeat_interval.is_zero() && self.heartbeat_timeout.is_zero() {
            return Err(SettingsError::invalid(
                "MARKET_VIEW_HEARTBEAT_TIMEOUT_SECS",
                "0",
            ));
        }
        Ok(())
    }
}

/// HTTP collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// Base URL of the historical and asset endpoints.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Initial view settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    /// Rows shown.
    pub display_count: DisplayCount,
    /// Initial sort column (descending).
    pub sort_key: SortKey,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            display_count: DisplayCount::default(),
            sort_key: SortKey::Volume,
        }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorConfig {
    /// Stream settings.
    pub stream: StreamSettings,
    /// Collaborator settings.
    pub api: ApiSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// View settings.
    pub view: ViewSettings,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a URL has the wrong scheme, a view
    /// setting is not recognized, or a reconnect or heartbeat timing is
    /// out of range.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`MonitorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            url: env.url(
                "MARKET_VIEW_STREAM_URL",
                stream_defaults.url,
                &["ws://", "wss://"],
            )?,
            reconnect_delay_initial: env.duration_millis(
                "MARKET_VIEW_RECONNECT_DELAY_INITIAL_MS",
                stream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "MARKET_VIEW_RECONNECT_DELAY_MAX_SECS",
                stream_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER",
                stream_defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env.parse(
                "MARKET_VIEW_RECONNECT_JITTER",
                stream_defaults.reconnect_jitter,
            ),
            max_reconnect_attempts: env.parse(
                "MARKET_VIEW_MAX_RECONNECT_ATTEMPTS",
                stream_defaults.max_reconnect_attempts,
            ),
            heartbeat_interval: env.duration_secs(
                "MARKET_VIEW_HEARTBEAT_INTERVAL_SECS",
                stream_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "MARKET_VIEW_HEARTBEAT_TIMEOUT_SECS",
                stream_defaults.heartbeat_timeout,
            ),
            event_buffer: env
                .parse("MARKET_VIEW_EVENT_BUFFER", stream_defaults.event_buffer)
                .max(1),
            outbound_buffer: env
                .parse("MARKET_VIEW_OUTBOUND_BUFFER", stream_defaults.outbound_buffer)
                .max(1),
        };
        stream.validate()?;

        let api_defaults = ApiSettings::default();
        let api = ApiSettings {
            base_url: env.url(
                "MARKET_VIEW_API_URL",
                api_defaults.base_url,
                &["http://", "https://"],
            )?,
            timeout: env.duration_secs("MARKET_VIEW_HTTP_TIMEOUT_SECS", api_defaults.timeout),
        };

        let server = ServerSettings {
            health_port: env.parse(
                "MARKET_VIEW_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let mut view = ViewSettings::default();
        if let Some(raw) = env.get("MARKET_VIEW_DISPLAY_COUNT") {
            let count = raw
                .parse::<u32>()
                .map_err(|_| SettingsError::invalid("MARKET_VIEW_DISPLAY_COUNT", &raw))?;
            view.display_count = DisplayCount::try_from(count).map_err(|source| {
                SettingsError::View {
                    key: "MARKET_VIEW_DISPLAY_COUNT",
                    source,
                }
            })?;
        }
        if let Some(raw) = env.get("MARKET_VIEW_SORT_KEY") {
            view.sort_key = raw.parse().map_err(|source| SettingsError::View {
                key: "MARKET_VIEW_SORT_KEY",
                source,
            })?;
        }

        Ok(Self {
            stream,
            api,
            server,
            view,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A URL does not use an accepted scheme.
    #[error("{key} must start with one of {expected:?} (got {value:?})")]
    InvalidUrl {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted schemes.
        expected: &'static [&'static str],
    },
    /// A value could not be parsed.
    #[error("{key} has an invalid value: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A view setting was rejected.
    #[error("{key}: {source}")]
    View {
        /// Variable name.
        key: &'static str,
        /// Why.
        #[source]
        source: ConfigError,
    },
}

impl SettingsError {
    fn invalid(key: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn url(
        &self,
        key: &'static str,
        default: String,
        expected: &'static [&'static str],
    ) -> Result<String, SettingsError> {
        let value = self.get(key).unwrap_or(default);
        if expected.iter().any(|scheme| value.starts_with(scheme)) {
            Ok(value.trim_end_matches('/').to_string())
        } else {
            Err(SettingsError::InvalidUrl {
                key,
                value,
                expected,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<MonitorConfig, SettingsError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        MonitorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.stream.url, "ws://localhost:8000/ws");
        assert_eq!(config.stream.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(config.stream.reconnect_delay_max, Duration::from_secs(30));
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.view.display_count, DisplayCount::Twenty);
        assert_eq!(config.view.sort_key, SortKey::Volume);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("MARKET_VIEW_STREAM_URL", "wss://feed.example.com/ws"),
            ("MARKET_VIEW_API_URL", "https://api.example.com/"),
            ("MARKET_VIEW_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("MARKET_VIEW_MAX_RECONNECT_ATTEMPTS", "5"),
            ("MARKET_VIEW_HEALTH_PORT", "0"),
            ("MARKET_VIEW_DISPLAY_COUNT", "50"),
            ("MARKET_VIEW_SORT_KEY", "percent_change"),
        ])
        .unwrap();

        assert_eq!(config.stream.url, "wss://feed.example.com/ws");
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.stream.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert_eq!(config.server.health_port, 0);
        assert_eq!(config.view.display_count, DisplayCount::Fifty);
        assert_eq!(config.view.sort_key, SortKey::PercentChange);
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = load(&[
            ("MARKET_VIEW_HEALTH_PORT", "http"),
            ("MARKET_VIEW_EVENT_BUFFER", "0"),
        ])
        .unwrap();
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.stream.event_buffer, 1);
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(matches!(
            load(&[("MARKET_VIEW_STREAM_URL", "http://localhost:8000/ws")]),
            Err(SettingsError::InvalidUrl { key: "MARKET_VIEW_STREAM_URL", .. })
        ));
        assert!(matches!(
            load(&[("MARKET_VIEW_API_URL", "ftp://files")]),
            Err(SettingsError::InvalidUrl { key: "MARKET_VIEW_API_URL", .. })
        ));
    }

    #[test]
    fn reads_heartbeat_and_outbound_settings() {
        let config = load(&[
            ("MARKET_VIEW_HEARTBEAT_INTERVAL_SECS", "0"),
            ("MARKET_VIEW_HEARTBEAT_TIMEOUT_SECS", "0"),
            ("MARKET_VIEW_OUTBOUND_BUFFER", "8"),
        ])
        .unwrap();
        assert!(config.stream.heartbeat_interval.is_zero());
        assert_eq!(config.stream.outbound_buffer, 8);

        let defaults = load(&[]).unwrap();
        assert_eq!(defaults.stream.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(defaults.stream.heartbeat_timeout, Duration::from_secs(20));
    }

    #[test_case("MARKET_VIEW_RECONNECT_JITTER", "inf" ; "infinite jitter")]
    #[test_case("MARKET_VIEW_RECONNECT_JITTER", "NaN" ; "nan jitter")]
    #[test_case("MARKET_VIEW_RECONNECT_JITTER", "1.5" ; "jitter above one")]
    #[test_case("MARKET_VIEW_RECONNECT_JITTER", "-0.1" ; "negative jitter")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "0" ; "zero multiplier")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "-2" ; "negative multiplier")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "0.5" ; "shrinking multiplier")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "NaN" ; "nan multiplier")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "inf" ; "infinite multiplier")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_INITIAL_MS", "0" ; "zero initial delay")]
    #[test_case("MARKET_VIEW_RECONNECT_DELAY_MAX_SECS", "0" ; "zero max delay")]
    #[test_case("MARKET_VIEW_HEARTBEAT_TIMEOUT_SECS", "0" ; "zero heartbeat timeout")]
    fn rejects_unusable_timing(key: &str, value: &str) {
        match load(&[(key, value)]) {
            Err(SettingsError::InvalidValue { key: rejected, .. }) => assert_eq!(rejected, key),
            other => panic!("expected InvalidValue for {key}={value}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_boundary_timing() {
        let config = load(&[
            ("MARKET_VIEW_RECONNECT_JITTER", "1"),
            ("MARKET_VIEW_RECONNECT_DELAY_MULTIPLIER", "1"),
        ])
        .unwrap();
        assert!((config.stream.reconnect_jitter - 1.0).abs() < f64::EPSILON);
        assert!((config.stream.reconnect_delay_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_view_settings() {
        assert!(matches!(
            load(&[("MARKET_VIEW_DISPLAY_COUNT", "25")]),
            Err(SettingsError::View { .. })
        ));
        assert!(matches!(
            load(&[("MARKET_VIEW_DISPLAY_COUNT", "many")]),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[("MARKET_VIEW_SORT_KEY", "price")]),
            Err(SettingsError::View { .. })
        ));
    }
}
