#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Market View - Live Filtered Market Monitor
//!
//! Ingests full-market snapshot frames from a WebSocket broadcaster and
//! maintains a filtered, sorted view of the instruments together with
//! market-wide statistics.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: pure data and computations
//!   - `snapshot`: instrument snapshots and the generation store
//!   - `view`: filter, sort and truncate engine
//!   - `stats`: breadth, top movers, most active
//!   - `connection`: stream connection states
//!   - `instrument`: historical and asset reference types
//!
//! - **Application**: services and ports
//!   - `ports`: the HTTP collaborator contract
//!   - `services`: `MarketView`, `MarketMonitor`, `DetailService`
//!
//! - **Infrastructure**: adapters
//!   - `stream`: WebSocket transport, reconnect backoff, frame codec
//!   - `collaborator`: `reqwest` client for historical and asset data
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! WebSocket --> TransportManager --> JsonCodec --> SnapshotStore
//!                                                      |
//!                         FilterConfig, SortConfig --> compute --> visible rows
//!                                                      |
//!                                                  summarize --> MarketStats
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Snapshot types and pure view computations.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::snapshot::{InstrumentSnapshot, SnapshotStore};
pub use domain::stats::{MarketStats, summarize};
pub use domain::view::{
    ConfigError, DisplayCount, FilterConfig, FilterUpdate, SortConfig, SortDirection, SortKey,
    compute,
};

// Services
pub use application::services::{
    DetailService, DetailState, MarketMonitor, MarketView, MonitorEvent, MonitorStatus,
};

// Transport
pub use infrastructure::stream::{
    DecodeError, HeartbeatConfig, JsonCodec, ReconnectConfig, TransportConfig, TransportEvent,
    TransportEventKind, TransportManager,
};

// Config
pub use infrastructure::config::{MonitorConfig, SettingsError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
