//! # Command Relay Server
//!
//! This binary runs a token-authenticated TCP command relay with
//! per-IP allowlisting, a bounded worker pool, and serialized command
//! execution through a single executor task.
//!
//! ## Features
//! - Line-oriented `<token>:<command>` request protocol
//! - Hot configuration reload from an operator console
//! - Graceful shutdown handling
//! - File- and environment-based configuration loading
//! - Health monitoring via HTTP metrics endpoint
//!
//! ## Dependencies
//! - `tokio` for the asynchronous runtime
//! - `config` + `dotenv` for configuration
//! - `tracing` for logging

use std::sync::Arc;
use std::time::Duration;

use command_relay::{admin, config::ConfigStore, server, utils::ErrorLog};
use command_relay::server::{
    spawn_executor, ConnectionRateLimiter, HealthMetrics, RelayServer, ServerState,
    SessionManager, ShellExecutor,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Entry point for the relay application.
///
/// Loads configuration, initializes logging, wires the executor bridge
/// and starts the TCP listener plus the operator console.
///
/// # Errors
/// Returns an error if configuration loading fails or if the server
/// fails to bind its port.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".to_string());
    let store = Arc::new(ConfigStore::load(&config_path)?);
    let config = store.current();

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let error_log_path =
        std::env::var("RELAY_ERROR_LOG").unwrap_or_else(|_| "errors.log".to_string());

    let (dispatch, _executor_task) = spawn_executor(
        ShellExecutor,
        config.max_clients,
        Duration::from_secs(config.dispatch_timeout_secs),
    );

    let state = Arc::new(ServerState {
        config: store.clone(),
        sessions: SessionManager::new(),
        dispatch,
        metrics: HealthMetrics::new(),
        rate_limiter: ConnectionRateLimiter::new(config.connection_rate_limit),
        error_log: ErrorLog::new(error_log_path),
    });

    let server = Arc::new(RelayServer::new(state.clone()));
    server.start().await?;
    info!("{}", config.messages.activated);

    if config.enable_metrics {
        tokio::spawn(server::health::serve_metrics_http(
            state.clone(),
            config.metrics_port,
        ));
    }

    // Serve until the operator console exits or a shutdown signal arrives
    tokio::select! {
        _ = admin_console(server.clone()) => {},
        _ = shutdown_signal() => {
            info!("Shutting down gracefully");
        }
    }

    server.stop().await;
    Ok(())
}

/// Operator console on stdin for the administrative subcommands.
///
/// Local console access stands in for the host's elevated privilege;
/// remote clients never reach this surface.
async fn admin_console(server: Arc<RelayServer>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    info!("{}", admin::USAGE);
                    continue;
                }
                match admin::AdminCommand::parse(&line) {
                    Some(command) => info!("{}", admin::handle(command, &server)),
                    None => warn!("Unknown subcommand. {}", admin::USAGE),
                }
            }
            // Stdin is gone; keep serving until a signal arrives.
            Ok(None) => std::future::pending::<()>().await,
            Err(e) => {
                error!("Console read error: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Listens for a shutdown signal (Ctrl+C) and initiates a graceful shutdown.
async fn shutdown_signal() {
    signal::ctrl_c().await.expect("Failed to listen for shutdown signal");
}
