//! Domain Layer - Market snapshots and the pure computations over them.
//!
//! Nothing in this layer performs I/O. Types here are plain Rust with
//! serialization support.

/// Connection state of the market stream.
pub mod connection;

/// Historical and asset reference types.
pub mod instrument;

/// Instrument snapshots and the snapshot store.
pub mod snapshot;

/// Market-wide statistics.
pub mod stats;

/// Filter, sort and truncate engine.
pub mod view;
