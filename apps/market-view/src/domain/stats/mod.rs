//! Market Statistics
//!
//! Market-wide summary figures computed over the full snapshot set. The
//! user's filter never applies here.
//!
//! # Top-5 Ordering
//!
//! Every ranking uses a stable sort on its key and breaks exact ties by
//! symbol ascending, so the result does not depend on upstream row order.

use std::cmp::Ordering;

use serde::Serialize;

use crate::domain::snapshot::InstrumentSnapshot;

/// Number of rows in each ranking.
pub const TOP_N: usize = 5;

/// Summary of the whole market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStats {
    /// Sum of volume.
    pub total_volume: u64,
    /// Sum of trade counts.
    pub total_trades: u64,
    /// Mean `current_price`.
    pub avg_price: f64,
    /// Gainers versus the rest.
    pub breadth: MarketBreadth,
    /// Highest `percent_change`, largest first.
    pub top_gainers: Vec<Mover>,
    /// Lowest `percent_change`, most negative first.
    pub top_losers: Vec<Mover>,
    /// Largest volume first.
    pub most_active_by_volume: Vec<ActiveInstrument>,
    /// Largest trade count first.
    pub most_active_by_trades: Vec<ActiveInstrument>,
}

/// Share of instruments with a positive change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketBreadth {
    /// Instruments with `percent_change > 0`.
    pub gainers: usize,
    /// All other instruments, unchanged included.
    pub losers: usize,
    /// `gainers / total * 100`, one decimal place.
    pub ratio: f64,
}

/// A top gainer or loser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mover {
    /// Symbol.
    pub symbol: String,
    /// Change in percent.
    pub percent_change: f64,
    /// `current_price` with two decimals.
    pub price: String,
}

/// A most-active entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveInstrument {
    /// Symbol.
    pub symbol: String,
    /// Traded volume.
    pub volume: u64,
    /// Number of trades.
    pub trade_count: u64,
}

/// Compute market statistics.
///
/// Returns `None` for an empty set rather than dividing by zero.
#[must_use]
pub fn summarize(snapshots: &[InstrumentSnapshot]) -> Option<MarketStats> {
    if snapshots.is_empty() {
        return None;
    }

    let total = snapshots.len();
    let total_volume = snapshots.iter().map(|s| s.volume).fold(0_u64, u64::saturating_add);
    let total_trades = snapshots
        .iter()
        .map(|s| s.trade_count)
        .fold(0_u64, u64::saturating_add);

    #[allow(clippy::cast_precision_loss)]
    let avg_price = snapshots.iter().map(|s| s.current_price).sum::<f64>() / total as f64;

    let gainers = snapshots.iter().filter(|s| s.percent_change > 0.0).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = round_one_decimal(gainers as f64 / total as f64 * 100.0);

    let top_gainers = ranked(snapshots, |a, b| b.percent_change.total_cmp(&a.percent_change))
        .map(mover)
        .collect();
    let top_losers = ranked(snapshots, |a, b| a.percent_change.total_cmp(&b.percent_change))
        .map(mover)
        .collect();
    let most_active_by_volume = ranked(snapshots, |a, b| b.volume.cmp(&a.volume))
        .map(active)
        .collect();
    let most_active_by_trades = ranked(snapshots, |a, b| b.trade_count.cmp(&a.trade_count))
        .map(active)
        .collect();

    Some(MarketStats {
        total_volume,
        total_trades,
        avg_price,
        breadth: MarketBreadth {
            gainers,
            losers: total - gainers,
            ratio,
        },
        top_gainers,
        top_losers,
        most_active_by_volume,
        most_active_by_trades,
    })
}

/// Top `TOP_N` snapshots under `order`, ties broken by symbol.
fn ranked<'a, F>(
    snapshots: &'a [InstrumentSnapshot],
    order: F,
) -> impl Iterator<Item = &'a InstrumentSnapshot>
where
    F: Fn(&InstrumentSnapshot, &InstrumentSnapshot) -> Ordering,
{
    let mut rows: Vec<&InstrumentSnapshot> = snapshots.iter().collect();
    rows.sort_by(|a, b| order(a, b).then_with(|| a.symbol.cmp(&b.symbol)));
    rows.into_iter().take(TOP_N)
}

fn mover(snapshot: &InstrumentSnapshot) -> Mover {
    Mover {
        symbol: snapshot.symbol.clone(),
        percent_change: snapshot.percent_change,
        price: format!("{:.2}", snapshot.current_price),
    }
}

fn active(snapshot: &InstrumentSnapshot) -> ActiveInstrument {
    ActiveInstrument {
        symbol: snapshot.symbol.clone(),
        volume: snapshot.volume,
        trade_count: snapshot.trade_count,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::snapshot;

    fn movers(rows: &[Mover]) -> Vec<&str> {
        rows.iter().map(|m| m.symbol.as_str()).collect()
    }

    fn actives(rows: &[ActiveInstrument]) -> Vec<&str> {
        rows.iter().map(|a| a.symbol.as_str()).collect()
    }

    #[test]
    fn empty_set_has_no_stats() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn three_instrument_example() {
        let snapshots = vec![
            snapshot("AAA", 10.0, 5.0, 100, 1),
            snapshot("BBB", 20.0, -3.0, 400, 1),
            snapshot("CCC", 30.0, 1.0, 50, 1),
        ];

        let stats = summarize(&snapshots).unwrap();
        assert!((stats.breadth.ratio - 66.7).abs() < 1e-9);
        assert_eq!(stats.breadth.gainers, 2);
        assert_eq!(stats.breadth.losers, 1);
        assert_eq!(
            actives(&stats.most_active_by_volume),
            vec!["BBB", "AAA", "CCC"]
        );
        assert_eq!(stats.total_volume, 550);
        assert!((stats.avg_price - 20.0).abs() < 1e-9);
    }

    #[test]
    fn unchanged_counts_as_loser() {
        let snapshots = vec![
            snapshot("UP", 1.0, 0.1, 1, 1),
            snapshot("FLAT", 1.0, 0.0, 1, 1),
        ];
        let stats = summarize(&snapshots).unwrap();
        assert_eq!(stats.breadth.gainers, 1);
        assert_eq!(stats.breadth.losers, 1);
        assert!((stats.breadth.ratio - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rankings_keep_five() {
        let snapshots: Vec<_> = (0..8_u64)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let pct = i as f64 - 4.0;
                snapshot(&format!("S{i}"), 1.0, pct, i * 10, 8 - i)
            })
            .collect();

        let stats = summarize(&snapshots).unwrap();
        assert_eq!(
            movers(&stats.top_gainers),
            vec!["S7", "S6", "S5", "S4", "S3"]
        );
        assert_eq!(
            movers(&stats.top_losers),
            vec!["S0", "S1", "S2", "S3", "S4"]
        );
        assert_eq!(
            actives(&stats.most_active_by_trades),
            vec!["S0", "S1", "S2", "S3", "S4"]
        );
        assert_eq!(stats.total_trades, 36);
    }

    #[test]
    fn ties_break_by_symbol_regardless_of_input_order() {
        let forward = vec![
            snapshot("ZED", 1.0, 2.0, 100, 1),
            snapshot("ALF", 1.0, 2.0, 100, 1),
            snapshot("MID", 1.0, 2.0, 100, 1),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        for snapshots in [forward, backward] {
            let stats = summarize(&snapshots).unwrap();
            assert_eq!(
                movers(&stats.top_gainers),
                vec!["ALF", "MID", "ZED"]
            );
            assert_eq!(
                actives(&stats.most_active_by_volume),
                vec!["ALF", "MID", "ZED"]
            );
        }
    }

    #[test]
    fn mover_price_has_two_decimals() {
        let stats = summarize(&[snapshot("AAA", 187.4, 1.0, 1, 1)]).unwrap();
        assert_eq!(stats.top_gainers[0].price, "187.40");
        assert!((stats.top_gainers[0].percent_change - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_rounds_to_one_decimal() {
        assert!((round_one_decimal(33.333_333) - 33.3).abs() < 1e-9);
        assert!((round_one_decimal(66.666_666) - 66.7).abs() < 1e-9);
        assert!((round_one_decimal(100.0) - 100.0).abs() < 1e-9);
    }
}
