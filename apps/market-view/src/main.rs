//! Market View Binary
//!
//! Connects to the market stream, keeps the live view current and logs a
//! summary after every snapshot replacement.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-view              # follow the live stream
//! cargo run --bin market-view details AAPL # print one instrument's details as JSON
//! ```
//!
//! # Environment Variables
//!
//! - `MARKET_VIEW_STREAM_URL`: WebSocket URL (default: ws://localhost:8000/ws)
//! - `MARKET_VIEW_API_URL`: historical/asset API base (default: <http://localhost:8000>)
//! - `MARKET_VIEW_HEALTH_PORT`: health check HTTP port, 0 disables (default: 8083)
//! - `MARKET_VIEW_RECONNECT_DELAY_INITIAL_MS`: first reconnect delay (default: 1000)
//! - `MARKET_VIEW_RECONNECT_DELAY_MAX_SECS`: reconnect delay cap (default: 30)
//! - `MARKET_VIEW_HEARTBEAT_INTERVAL_SECS`: silence before a ping, 0 disables (default: 20)
//! - `MARKET_VIEW_HEARTBEAT_TIMEOUT_SECS`: time allowed for a reply to a ping (default: 20)
//! - `MARKET_VIEW_DISPLAY_COUNT`: rows shown, 10 | 20 | 50 | 100 (default: 20)
//! - `MARKET_VIEW_SORT_KEY`: initial sort column (default: volume)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use market_view::application::services::{
    DetailService, MarketMonitor, MarketView, MonitorEvent,
};
use market_view::domain::view::{FilterConfig, SortConfig, SortDirection};
use market_view::infrastructure::collaborator::HttpCollaborator;
use market_view::infrastructure::config::MonitorConfig;
use market_view::infrastructure::health::{HealthServer, HealthServerState};
use market_view::infrastructure::stream::TransportConfig;
use market_view::infrastructure::telemetry;
use market_view::init_metrics;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let telemetry_guard = telemetry::init();

    let config = MonitorConfig::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, symbol] = args.as_slice()
        && command == "details"
    {
        return print_details(&config, symbol).await;
    }

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting Market View"
    );
    let _metrics_handle = init_metrics();
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let view = MarketView::new(
        FilterConfig {
            display_count: config.view.display_count,
            ..FilterConfig::default()
        },
        SortConfig::new(config.view.sort_key, SortDirection::Descending),
    );
    let mut monitor = MarketMonitor::new(
        TransportConfig::from_stream_settings(&config.stream),
        config.stream.event_buffer,
        view,
    );

    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            monitor.status(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    monitor.connect(&config.stream.url);
    let sort = monitor.view().sort();
    tracing::info!(
        sort_key = sort.key.as_str(),
        descending = sort.direction == SortDirection::Descending,
        display_count = u32::from(monitor.view().filter().display_count),
        "Market view ready"
    );

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            change = monitor.next_change() => match change {
                Some(event) => log_change(&monitor, &event),
                None => break,
            },
        }
    }

    monitor.disconnect().await;
    tracing::info!("Market view stopped");
    Ok(())
}

/// Fetch and print one instrument's details.
async fn print_details(
    config: &MonitorConfig,
    symbol: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let collaborator = HttpCollaborator::new(&config.api)?;
    let details = DetailService::new(Arc::new(collaborator)).load(symbol).await;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

fn log_change(monitor: &MarketMonitor, event: &MonitorEvent) {
    let view = monitor.view();
    match event {
        MonitorEvent::ConnectionChanged(state) => {
            tracing::info!(state = %state, "Stream connection changed");
        }
        MonitorEvent::ViewUpdated { revision } => {
            let Some(stats) = view.stats() else {
                tracing::info!(revision, "Snapshot set is empty");
                return;
            };
            tracing::info!(
                revision,
                instruments = view.instrument_count(),
                visible = view.visible().len(),
                gainers = stats.breadth.gainers,
                losers = stats.breadth.losers,
                breadth_pct = stats.breadth.ratio,
                top_gainer = stats.top_gainers.first().map_or("-", |m| m.symbol.as_str()),
                top_loser = stats.top_losers.first().map_or("-", |m| m.symbol.as_str()),
                "Market view updated"
            );
        }
        MonitorEvent::MarketStatus(status) => {
            tracing::info!(status = %status, "Market status");
        }
        MonitorEvent::UpstreamError(message) => {
            tracing::warn!(message = %message, "Upstream error");
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn log_config(config: &MonitorConfig) {
    tracing::info!(
        stream_url = %config.stream.url,
        api_url = %config.api.base_url,
        health_port = config.server.health_port,
        display_count = u32::from(config.view.display_count),
        sort_key = config.view.sort_key.as_str(),
        "Configuration loaded"
    );
    tracing::debug!(
        initial_ms = u64::try_from(config.stream.reconnect_delay_initial.as_millis())
            .unwrap_or(u64::MAX),
        max_secs = config.stream.reconnect_delay_max.as_secs(),
        multiplier = config.stream.reconnect_delay_multiplier,
        max_attempts = config.stream.max_reconnect_attempts,
        "Reconnect policy"
    );
    tracing::debug!(
        interval_secs = config.stream.heartbeat_interval.as_secs(),
        timeout_secs = config.stream.heartbeat_timeout.as_secs(),
        outbound_buffer = config.stream.outbound_buffer,
        "Heartbeat"
    );
}

/// Wait for SIGTERM or Ctrl+C, then cancel `shutdown_token`.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
