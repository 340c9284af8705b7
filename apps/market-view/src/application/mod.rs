//! Application Layer - Use cases and port definitions.
//!
//! Services here own the domain state and drive it from transport events
//! and host commands.

/// Port interfaces for external collaborators.
pub mod ports;

/// Market view, monitor and detail services.
pub mod services;
