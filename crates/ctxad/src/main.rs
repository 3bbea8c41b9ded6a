//! ctxad - Context Adapter Daemon
//!
//! Bridges an NGSI v1 context broker with third-party "button" services.
//!
//! Usage:
//!   ctxad [config.toml]
//!
//! Every configuration value can be overridden with a `CTXA_*` environment
//! variable. Without a config file, defaults plus environment are used.

mod config;

use std::sync::Arc;
use std::time::Duration;

use ctxa_api::{create_router, AppState, RequestCounter};
use ctxa_client::{BrokerClient, HttpDispatcher};
use ctxa_orchestrator::OperationOrchestrator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AdapterConfig, LogFormat};

/// Parsed command-line arguments
struct Args {
    /// Adapter config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args { config_path: None };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("ctxad {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"ctxad - Context Adapter Daemon

Usage: ctxad [OPTIONS] [config.toml]

Options:
  -h, --help       Print this help message
  -V, --version    Print the version

Environment overrides (take precedence over the file):
  CTXA_MODE                 context_provider | notification
  CTXA_ADAPTER_HOST, CTXA_ADAPTER_PORT, CTXA_ADAPTER_BASE_PATH,
  CTXA_CALLBACK_PATH, CTXA_PUBLIC_URL
  CTXA_BROKER_HOST, CTXA_BROKER_PORT, CTXA_BROKER_BASE_PATH,
  CTXA_BROKER_TIMEOUT_MS
  CTXA_DEFAULT_SERVICE, CTXA_DEFAULT_SERVICE_PATH
  CTXA_BUTTON_TYPE, CTXA_SERVICE_TYPE
  CTXA_LOG_LEVEL, CTXA_LOG_FORMAT (text | json), CTXA_HEARTBEAT_SECS

Examples:
  # Context provider against a local broker
  ctxad

  # Notification mode from a config file
  CTXA_MODE=notification ctxad adapter.toml
"#
    );
}

fn init_tracing(config: &AdapterConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_directive().into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Log and reset the attended-request counter every `period`
fn spawn_heartbeat(counter: Arc<RequestCounter>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracing::info!(requests = counter.take(), period_secs = period.as_secs(), "Heartbeat");
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    let config = AdapterConfig::load(args.config_path.as_deref())?;

    init_tracing(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %config.mode,
        "Starting ctxad (Context Adapter Daemon)"
    );
    if let Some(path) = &args.config_path {
        tracing::info!("Loaded config from: {}", path);
    }

    let broker = BrokerClient::with_timeout(&config.broker_url(), config.broker_timeout())?;
    tracing::info!(broker = %broker.base_url(), "Using context broker");

    let callback_url = config.callback_url();
    tracing::info!(%callback_url, "Third-party callback URL");

    let orchestrator = Arc::new(OperationOrchestrator::new(
        Arc::new(broker),
        Arc::new(HttpDispatcher::new()),
        Arc::new(config.scheme()),
        callback_url,
    ));

    let counter = Arc::new(RequestCounter::new());
    let heartbeat = (config.log.heartbeat_secs > 0).then(|| {
        spawn_heartbeat(
            counter.clone(),
            Duration::from_secs(config.log.heartbeat_secs),
        )
    });

    let state = AppState::with_counter(orchestrator, config.api(), counter);
    let app = create_router(state);

    let addr = format!("{}:{}", config.adapter.host, config.adapter.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = heartbeat {
        handle.abort();
    }
    tracing::info!("ctxad stopped");
    Ok(())
}
