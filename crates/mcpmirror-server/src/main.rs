//! mcpmirrord: the bootstrap front-end.
//!
//! Thin by design: parse flags, load the YAML configuration, construct
//! the store, registry manager and sync lane, then serve HTTP until the
//! shutdown signal. Exit codes: 0 clean shutdown, 1 startup or config
//! failure, 2 fatal runtime error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mcpmirror_core::config::RegistryConfig;
use mcpmirror_server::http::AppState;
use mcpmirror_server::service::RegistryManager;
use mcpmirror_server::sync::SyncLauncher;

#[derive(Debug, Parser)]
#[command(name = "mcpmirrord", about = "MCP registry aggregation server", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "MCPMIRROR_CONFIG")]
    config: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:8080", env = "MCPMIRROR_ADDRESS")]
    address: SocketAddr,

    /// Directory for persisted snapshots and sync status
    #[arg(long, default_value = "./data", env = "MCPMIRROR_DATA_DIR")]
    data_dir: PathBuf,

    /// Disable permissive CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let (listener, router, cancel) = match startup(&args).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("[Main] startup failed: {e:#}");
            return ExitCode::from(1);
        }
    };

    info!("[Main] listening on {}", args.address);
    match serve(listener, router, cancel).await {
        Ok(()) => {
            info!("[Main] clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("[Main] fatal runtime error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Everything that must succeed before the process is considered started.
async fn startup(args: &Args) -> Result<(TcpListener, axum::Router, CancellationToken)> {
    let config = RegistryConfig::load(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    info!(
        "[Main] registry {:?} from {} source",
        config.registry_name, config.source.source_type
    );

    let cancel = CancellationToken::new();
    let launcher = Arc::new(SyncLauncher::new(args.data_dir.clone(), cancel.clone()));
    let manager = Arc::new(RegistryManager::new(config.registry_name.clone()));

    let entry = launcher
        .launch_synced(config, true)
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("start sync lane")?;
    manager
        .insert(entry)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let router = mcpmirror_server::build_router(
        AppState {
            manager,
            launcher,
        },
        !args.no_cors,
    );

    let listener = TcpListener::bind(args.address)
        .await
        .with_context(|| format!("bind {}", args.address))?;

    Ok((listener, router, cancel))
}

/// Serve until ctrl-c; the cancellation token fans out to every sync lane
/// and to the HTTP server's graceful shutdown.
async fn serve(
    listener: TcpListener,
    router: axum::Router,
    cancel: CancellationToken,
) -> Result<()> {
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[Main] shutdown signal received");
            shutdown_token.cancel();
        }
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("serve HTTP")?;
    Ok(())
}
