//! Derived View Engine
//!
//! Turns the full snapshot set plus the user's filter and sort settings into
//! the exact list of rows presented to a consumer.
//!
//! # Algorithm
//!
//! 1. **Filter**: keep a snapshot iff `current_price` is in
//!    `[min_price, max_price]`, `volume` is in `[min_volume, max_volume]`
//!    (both inclusive, an absent max is unbounded) and
//!    `trade_count >= min_trade_count`.
//! 2. **Sort**: stable sort on the configured key. Equal keys keep their
//!    input order in both directions; there is no secondary key.
//! 3. **Truncate**: keep the first `display_count` rows.
//!
//! [`compute`] is pure. Inverted ranges are not errors, they produce an
//! empty view.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::snapshot::InstrumentSnapshot;

// =============================================================================
// Errors
// =============================================================================

/// Invalid filter or sort input, rejected at the configuration boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A bound is negative.
    #[error("{field} must not be negative (got {value})")]
    NegativeBound {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// A bound is NaN or infinite.
    #[error("{field} must be a finite number")]
    NonFiniteBound {
        /// Field name.
        field: &'static str,
    },
    /// Page size is not one of the offered sizes.
    #[error("unsupported display count {0} (expected one of 10, 20, 50, 100)")]
    UnsupportedDisplayCount(u32),
    /// Sort key does not name a snapshot field.
    #[error("unknown sort key: {0}")]
    UnknownSortKey(String),
}

// =============================================================================
// Filter
// =============================================================================

/// Page sizes offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u32")]
pub enum DisplayCount {
    /// 10 rows.
    Ten,
    /// 20 rows.
    #[default]
    Twenty,
    /// 50 rows.
    Fifty,
    /// 100 rows.
    Hundred,
}

impl DisplayCount {
    /// All offered page sizes, smallest first.
    pub const ALL: [Self; 4] = [Self::Ten, Self::Twenty, Self::Fifty, Self::Hundred];

    /// Number of rows.
    #[must_use]
    pub const fn get(self) -> usize {
        match self {
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Fifty => 50,
            Self::Hundred => 100,
        }
    }
}

impl TryFrom<u32> for DisplayCount {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            50 => Ok(Self::Fifty),
            100 => Ok(Self::Hundred),
            other => Err(ConfigError::UnsupportedDisplayCount(other)),
        }
    }
}

impl From<DisplayCount> for u32 {
    fn from(value: DisplayCount) -> Self {
        match value {
            DisplayCount::Ten => 10,
            DisplayCount::Twenty => 20,
            DisplayCount::Fifty => 50,
            DisplayCount::Hundred => 100,
        }
    }
}

/// The user's visible-subset settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Inclusive price floor.
    pub min_price: f64,
    /// Inclusive price ceiling, `None` for no ceiling.
    pub max_price: Option<f64>,
    /// Inclusive volume floor.
    pub min_volume: u64,
    /// Inclusive volume ceiling, `None` for no ceiling.
    pub max_volume: Option<u64>,
    /// Minimum number of trades.
    pub min_trade_count: u64,
    /// Rows kept after sorting.
    pub display_count: DisplayCount,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: 0.0,
            max_price: None,
            min_volume: 0,
            max_volume: None,
            min_trade_count: 0,
            display_count: DisplayCount::default(),
        }
    }
}

impl FilterConfig {
    /// Check whether a snapshot passes the filter.
    #[must_use]
    pub fn matches(&self, snapshot: &InstrumentSnapshot) -> bool {
        let price = snapshot.current_price;
        let price_ok = price >= self.min_price && self.max_price.is_none_or(|max| price <= max);
        let volume_ok = snapshot.volume >= self.min_volume
            && self.max_volume.is_none_or(|max| snapshot.volume <= max);

        price_ok && volume_ok && snapshot.trade_count >= self.min_trade_count
    }

    /// Produce the config that results from applying a partial update.
    ///
    /// `self` is left untouched, so a rejected update keeps the prior
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a price bound is negative or not finite, or
    /// the display count is not an offered page size.
    pub fn merged(&self, update: &FilterUpdate) -> Result<Self, ConfigError> {
        let mut next = self.clone();

        if let Some(min_price) = update.min_price {
            next.min_price = check_price("minPrice", min_price)?;
        }
        if let Some(max_price) = update.max_price {
            next.max_price = max_price
                .map(|value| check_price("maxPrice", value))
                .transpose()?;
        }
        if let Some(min_volume) = update.min_volume {
            next.min_volume = min_volume;
        }
        if let Some(max_volume) = update.max_volume {
            next.max_volume = max_volume;
        }
        if let Some(min_trade_count) = update.min_trade_count {
            next.min_trade_count = min_trade_count;
        }
        if let Some(display_count) = update.display_count {
            next.display_count = DisplayCount::try_from(display_count)?;
        }

        Ok(next)
    }
}

fn check_price(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFiniteBound { field });
    }
    if value < 0.0 {
        return Err(ConfigError::NegativeBound { field, value });
    }
    Ok(value)
}

/// Partial filter change requested by the host.
///
/// Absent fields keep their current value. For the ceilings, `Some(None)`
/// clears the bound and `Some(Some(v))` sets it.
///
/// # Wire Format (JSON)
/// ```json
/// {"minPrice": 5.0, "maxPrice": null, "displayCount": 50}
/// ```
/// An explicit `null` clears a ceiling; an omitted key leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    /// New price floor.
    pub min_price: Option<f64>,
    /// New price ceiling.
    #[serde(deserialize_with = "explicit_option")]
    pub max_price: Option<Option<f64>>,
    /// New volume floor.
    pub min_volume: Option<u64>,
    /// New volume ceiling.
    #[serde(deserialize_with = "explicit_option")]
    pub max_volume: Option<Option<u64>>,
    /// New trade count floor.
    pub min_trade_count: Option<u64>,
    /// New page size.
    pub display_count: Option<u32>,
}

fn explicit_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Sort
// =============================================================================

/// Snapshot field to order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// `symbol`
    Symbol,
    /// `current_price`
    CurrentPrice,
    /// `percent_change`
    PercentChange,
    /// `volume`
    Volume,
    /// `trade_count`
    TradeCount,
    /// `high`
    High,
    /// `low`
    Low,
    /// `vwap`
    Vwap,
    /// `std_dev`
    StdDev,
}

impl SortKey {
    /// Snapshot field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::CurrentPrice => "current_price",
            Self::PercentChange => "percent_change",
            Self::Volume => "volume",
            Self::TradeCount => "trade_count",
            Self::High => "high",
            Self::Low => "low",
            Self::Vwap => "vwap",
            Self::StdDev => "std_dev",
        }
    }

    /// Ascending comparison of two snapshots on this key.
    #[must_use]
    pub fn compare(self, a: &InstrumentSnapshot, b: &InstrumentSnapshot) -> Ordering {
        match self {
            Self::Symbol => a.symbol.cmp(&b.symbol),
            Self::CurrentPrice => a.current_price.total_cmp(&b.current_price),
            Self::PercentChange => a.percent_change.total_cmp(&b.percent_change),
            Self::Volume => a.volume.cmp(&b.volume),
            Self::TradeCount => a.trade_count.cmp(&b.trade_count),
            Self::High => a.high.total_cmp(&b.high),
            Self::Low => a.low.total_cmp(&b.low),
            Self::Vwap => a.vwap.total_cmp(&b.vwap),
            Self::StdDev => a.std_dev.total_cmp(&b.std_dev),
        }
    }
}

impl FromStr for SortKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(Self::Symbol),
            "current_price" => Ok(Self::CurrentPrice),
            "percent_change" => Ok(Self::PercentChange),
            "volume" => Ok(Self::Volume),
            "trade_count" => Ok(Self::TradeCount),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "vwap" => Ok(Self::Vwap),
            "std_dev" => Ok(Self::StdDev),
            other => Err(ConfigError::UnknownSortKey(other.to_string())),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// The other direction.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Sort key and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortConfig {
    /// Field to sort by.
    pub key: SortKey,
    /// Direction.
    pub direction: SortDirection,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            key: SortKey::Volume,
            direction: SortDirection::Descending,
        }
    }
}

impl SortConfig {
    /// Create a sort config.
    #[must_use]
    pub const fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Select a column: reselecting the current key flips the direction,
    /// any other key starts ascending.
    #[must_use]
    pub fn select(self, key: SortKey) -> Self {
        if self.key == key {
            Self {
                key,
                direction: self.direction.flipped(),
            }
        } else {
            Self {
                key,
                direction: SortDirection::Ascending,
            }
        }
    }

    /// Compare two snapshots under this config.
    #[must_use]
    pub fn compare(&self, a: &InstrumentSnapshot, b: &InstrumentSnapshot) -> Ordering {
        let ordering = self.key.compare(a, b);
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

// =============================================================================
// Compute
// =============================================================================

/// Filter, sort and truncate a snapshot set.
#[must_use]
pub fn compute(
    snapshots: &[InstrumentSnapshot],
    filter: &FilterConfig,
    sort: &SortConfig,
) -> Vec<InstrumentSnapshot> {
    let mut rows: Vec<&InstrumentSnapshot> =
        snapshots.iter().filter(|s| filter.matches(s)).collect();

    // `sort_by` is stable
    rows.sort_by(|a, b| sort.compare(a, b));

    rows.into_iter()
        .take(filter.display_count.get())
        .cloned()
        .collect()
}
