//! Instrument Snapshots
//!
//! The latest known state of every tracked instrument, and the store that
//! holds the current generation of them.
//!
//! # Replacement Semantics
//!
//! Every `market_data` message is the full authoritative state. The store
//! swaps the whole set in one step; there is no per-symbol update path and no
//! field-level merging between generations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

// =============================================================================
// Snapshot
// =============================================================================

/// One row per tracked symbol at a point in time.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "symbol": "AAPL", "current_price": 187.42, "percent_change": 1.25,
///   "volume": 1250000, "trade_count": 8421, "high": 188.1, "low": 185.9,
///   "vwap": 187.05, "std_dev": 0.42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    /// Ticker symbol, unique within a generation.
    pub symbol: String,
    /// Last traded price.
    pub current_price: f64,
    /// Change since the first observed price, in percent.
    pub percent_change: f64,
    /// Traded volume.
    pub volume: u64,
    /// Number of trades.
    pub trade_count: u64,
    /// Highest observed price.
    pub high: f64,
    /// Lowest observed price.
    pub low: f64,
    /// Volume-weighted average price.
    pub vwap: f64,
    /// Standard deviation of observed prices.
    pub std_dev: f64,
}

impl InstrumentSnapshot {
    /// Check the numeric invariants of a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` when the symbol is empty, a float is not
    /// finite, or `current_price`/`std_dev` is negative.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.symbol.trim().is_empty() {
            return Err(SnapshotError::EmptySymbol);
        }

        let floats = [
            ("current_price", self.current_price),
            ("percent_change", self.percent_change),
            ("high", self.high),
            ("low", self.low),
            ("vwap", self.vwap),
            ("std_dev", self.std_dev),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                return Err(SnapshotError::NonFinite {
                    symbol: self.symbol.clone(),
                    field,
                });
            }
        }

        for (field, value) in [
            ("current_price", self.current_price),
            ("std_dev", self.std_dev),
        ] {
            if value < 0.0 {
                return Err(SnapshotError::Negative {
                    symbol: self.symbol.clone(),
                    field,
                });
            }
        }

        Ok(())
    }
}

/// A snapshot that violates the data model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Symbol is empty or whitespace.
    #[error("snapshot has an empty symbol")]
    EmptySymbol,
    /// A float field is NaN or infinite.
    #[error("{symbol}: {field} is not a finite number")]
    NonFinite {
        /// Offending symbol.
        symbol: String,
        /// Offending field.
        field: &'static str,
    },
    /// A field that must be non-negative is negative.
    #[error("{symbol}: {field} must not be negative")]
    Negative {
        /// Offending symbol.
        symbol: String,
        /// Offending field.
        field: &'static str,
    },
}

/// Check whether a symbol is a plain listed equity ticker.
///
/// Accepts 1 to 4 uppercase ASCII letters and rejects test symbols, which
/// matches what the upstream broadcaster tracks.
#[must_use]
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 4
        && symbol.bytes().all(|b| b.is_ascii_uppercase())
        && !symbol.contains("TEST")
}

// =============================================================================
// Store
// =============================================================================

/// Holds the current generation of snapshots.
///
/// The set lives behind an `Arc<[_]>`, so a reader that grabbed
/// [`SnapshotStore::current`] keeps a complete generation even after a
/// replacement.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: Arc<[InstrumentSnapshot]>,
    generation: u64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::from(Vec::new()),
            generation: 0,
        }
    }

    /// Swap the entire held set for a new one.
    pub fn replace_all(&mut self, snapshots: Vec<InstrumentSnapshot>) {
        self.snapshots = Arc::from(snapshots);
        self.generation += 1;
    }

    /// Get the current generation, in upstream order.
    #[must_use]
    pub fn current(&self) -> Arc<[InstrumentSnapshot]> {
        Arc::clone(&self.snapshots)
    }

    /// Borrow the current generation.
    #[must_use]
    pub fn as_slice(&self) -> &[InstrumentSnapshot] {
        &self.snapshots
    }

    /// Number of replacements applied so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of instruments in the current generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the current generation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Look up a symbol in the current generation.
    #[must_use]
    pub fn find(&self, symbol: &str) -> Option<&InstrumentSnapshot> {
        self.snapshots.iter().find(|s| s.symbol == symbol)
    }
}
