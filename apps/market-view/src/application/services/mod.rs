//! Application Services
//!
//! - `MarketView`: snapshot store plus memoized view and statistics
//! - `MarketMonitor`: host surface driving a `MarketView` from the stream
//! - `DetailService`: per-instrument history and asset lookups

mod details;
mod market_view;
mod monitor;

pub use details::{DetailService, DetailState, InstrumentDetails};
pub use market_view::{InputChange, MarketView, UpstreamInfo};
pub use monitor::{MarketMonitor, MonitorEvent, MonitorStatus};
