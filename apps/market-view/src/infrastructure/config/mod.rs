//! Configuration Module
//!
//! Environment-driven configuration for the market view binary.

mod settings;

pub use settings::{
    ApiSettings, MonitorConfig, ServerSettings, SettingsError, StreamSettings, ViewSettings,
};
