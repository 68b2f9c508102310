#![forbid(unsafe_code)]

//! `notebook-mcp` — MCP notebook session coordination server binary.
//!
//! Bootstraps configuration, attaches the session registry, and serves
//! the MCP tool surface over stdio until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use notebook_mcp::config::GlobalConfig;
use notebook_mcp::mcp::handler::AppState;
use notebook_mcp::mcp::transport;
use notebook_mcp::session::SessionRegistry;
use notebook_mcp::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "notebook-mcp", about = "MCP notebook session coordination server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the Jupyter server base URL from the config file.
    #[arg(long)]
    server_url: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("notebook-mcp server bootstrap");

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
    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
    }

    // Load the Jupyter bearer token from keyring / env var.
    config.load_credentials().await?;

    let config = Arc::new(config);
    info!(server_url = %config.server_url, "configuration loaded");

    // ── Build shared application state ──────────────────
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&config)));
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        registry: Arc::clone(&registry),
    });

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let stdio_ct = ct.clone();
    let stdio_state = Arc::clone(&state);
    let stdio_handle = tokio::spawn(async move {
        if let Err(err) = transport::serve_stdio(stdio_state, stdio_ct).await {
            error!(%err, "stdio transport failed");
        }
    });

    info!("MCP server ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Graceful shutdown: release all sessions ─────────
    registry.close_all().await;

    let _ = stdio_handle.await;
    info!("notebook-mcp shut down");

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
    // Stdout carries the MCP protocol; all diagnostics go to stderr.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

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
