//! Market View Service
//!
//! Owns the snapshot store, the user's filter and sort settings, and the
//! memoized results derived from them.
//!
//! # Recompute Rule
//!
//! Every input change goes through [`MarketView::recompute`]:
//!
//! | Change      | View | Stats |
//! |-------------|------|-------|
//! | `Snapshots` | yes  | yes   |
//! | `Filter`    | yes  | no    |
//! | `Sort`      | yes  | no    |
//!
//! Statistics cover the full set and ignore the filter, so only a new
//! generation invalidates them. The revision counter increments on every
//! recompute.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::domain::connection::ConnectionState;
use crate::domain::snapshot::{InstrumentSnapshot, SnapshotStore};
use crate::domain::stats::{self, MarketStats};
use crate::domain::view::{self, ConfigError, FilterConfig, FilterUpdate, SortConfig, SortKey};
use crate::infrastructure::metrics;
use crate::infrastructure::stream::MarketDataFrame;

/// Which input changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChange {
    /// A new snapshot generation.
    Snapshots,
    /// Filter settings.
    Filter,
    /// Sort settings.
    Sort,
}

/// Metadata reported by the upstream broadcaster alongside the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamInfo {
    /// Broadcaster time of the last applied generation.
    pub last_update: Option<DateTime<Utc>>,
    /// Whether the broadcaster's own feed was connected at that time.
    pub upstream_connected: Option<bool>,
    /// Last `market_status` payload.
    pub market_status: Option<serde_json::Value>,
    /// Last upstream `error` message.
    pub last_error: Option<String>,
}

/// Live filtered and sorted view of the market.
#[derive(Debug, Clone)]
pub struct MarketView {
    store: SnapshotStore,
    filter: FilterConfig,
    sort: SortConfig,
    visible: Vec<InstrumentSnapshot>,
    stats: Option<MarketStats>,
    revision: u64,
    connection: ConnectionState,
    upstream: UpstreamInfo,
}

impl Default for MarketView {
    fn default() -> Self {
        Self::new(FilterConfig::default(), SortConfig::default())
    }
}

impl MarketView {
    /// Create an empty view with initial settings.
    #[must_use]
    pub fn new(filter: FilterConfig, sort: SortConfig) -> Self {
        Self {
            store: SnapshotStore::new(),
            filter,
            sort,
            visible: Vec::new(),
            stats: None,
            revision: 0,
            connection: ConnectionState::Disconnected,
            upstream: UpstreamInfo::default(),
        }
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Replace the snapshot set with a decoded frame.
    pub fn apply_frame(&mut self, frame: MarketDataFrame) {
        if frame.timestamp.is_some() {
            self.upstream.last_update = frame.timestamp;
        }
        if frame.upstream_connected.is_some() {
            self.upstream.upstream_connected = frame.upstream_connected;
        }
        self.replace_snapshots(frame.snapshots);
    }

    /// Replace the snapshot set.
    pub fn replace_snapshots(&mut self, snapshots: Vec<InstrumentSnapshot>) {
        self.store.replace_all(snapshots);
        metrics::set_instruments(self.store.len());
        self.recompute(InputChange::Snapshots);
    }

    /// Apply a partial filter change.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for invalid bounds or page size; the current
    /// filter is kept and nothing is recomputed.
    pub fn set_filter_config(&mut self, update: &FilterUpdate) -> Result<(), ConfigError> {
        self.filter = self.filter.merged(update)?;
        self.recompute(InputChange::Filter);
        Ok(())
    }

    /// Select a sort column: same key toggles direction, a new key sorts
    /// ascending. Returns the resulting config.
    pub fn set_sort_config(&mut self, key: SortKey) -> SortConfig {
        self.set_sort(self.sort.select(key));
        self.sort
    }

    /// Replace the sort config outright.
    pub fn set_sort(&mut self, sort: SortConfig) {
        self.sort = sort;
        self.recompute(InputChange::Sort);
    }

    /// Record the transport state. Returns `true` if it changed.
    pub fn set_connection_state(&mut self, state: ConnectionState) -> bool {
        let changed = self.connection != state;
        self.connection = state;
        changed
    }

    /// Record a `market_status` payload.
    pub fn record_market_status(&mut self, status: serde_json::Value) {
        self.upstream.market_status = Some(status);
    }

    /// Record an upstream error message.
    pub fn record_upstream_error(&mut self, message: String) {
        self.upstream.last_error = Some(message);
    }

    /// Recompute whatever `change` invalidates.
    pub fn recompute(&mut self, change: InputChange) {
        let started = Instant::now();
        let snapshots = self.store.as_slice();

        self.visible = view::compute(snapshots, &self.filter, &self.sort);
        if change == InputChange::Snapshots {
            self.stats = stats::summarize(snapshots);
        }
        self.revision += 1;

        metrics::record_recompute(started.elapsed());
        tracing::trace!(
            ?change,
            revision = self.revision,
            visible = self.visible.len(),
            "Recomputed market view"
        );
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Rows to present, in order.
    #[must_use]
    pub fn visible(&self) -> &[InstrumentSnapshot] {
        &self.visible
    }

    /// Market statistics, `None` while the set is empty.
    #[must_use]
    pub const fn stats(&self) -> Option<&MarketStats> {
        self.stats.as_ref()
    }

    /// Number of recomputes so far.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of instruments in the current generation.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.store.len()
    }

    /// Look up one instrument in the current generation.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<&InstrumentSnapshot> {
        self.store.find(symbol)
    }

    /// Current filter.
    #[must_use]
    pub const fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// Current sort.
    #[must_use]
    pub const fn sort(&self) -> SortConfig {
        self.sort
    }

    /// Last known transport state.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Upstream metadata.
    #[must_use]
    pub const fn upstream(&self) -> &UpstreamInfo {
        &self.upstream
    }
}
