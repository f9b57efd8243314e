#![forbid(unsafe_code)]

//! `applyflow` — session orchestrator server binary.
//!
//! Bootstraps configuration, connects the database, starts the
//! stale-session sweep, and serves the HTTP/SSE gateway.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use applyflow::config::GlobalConfig;
use applyflow::gateway;
use applyflow::orchestrator::sweeper;
use applyflow::persistence::db;
use applyflow::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "applyflow", about = "Job-application session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("applyflow server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let pool = db::connect(&config.db_path).await?;
    info!(db_path = %config.db_path.display(), "database connected");

    // ── Build shared application state ──────────────────
    let state = gateway::build_state(Arc::clone(&config), pool);

    // ── Start stale-session sweep ───────────────────────
    let ct = CancellationToken::new();
    let sweeper_handle = if config.sweep.enabled {
        Some(sweeper::spawn_sweeper(
            Arc::clone(&state.registry),
            Arc::clone(&state.control),
            config.sweep.clone(),
            ct.clone(),
        ))
    } else {
        info!("stale-session sweep disabled");
        None
    };

    // ── Serve the gateway ───────────────────────────────
    let bind = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind gateway on {bind}: {err}")))?;
    info!(%bind, "gateway listening");

    let serve_ct = ct.clone();
    axum::serve(listener, gateway::router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            serve_ct.cancel();
        })
        .await
        .map_err(|err| AppError::Io(format!("gateway server error: {err}")))?;

    // ── Wait for background tasks ───────────────────────
    ct.cancel();
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }
    info!("applyflow shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
