//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete transport, HTTP and observability adapters.

/// HTTP client for the historical and asset endpoints.
pub mod collaborator;

/// Environment-driven configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// WebSocket transport and frame codec.
pub mod stream;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
