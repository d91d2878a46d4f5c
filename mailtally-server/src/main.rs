//! # Mailtally Server
//!
//! Streams a mail archive, tallies senders, and serves the running totals.
//!
//! ## Overview
//!
//! - `mailtally-server` (no subcommand) serves the HTTP API
//! - `mailtally-server ingest <archive>` ingests one archive in the
//!   foreground and prints the final report as JSON

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailtally_server::{
    AppState, create_app,
    infra::config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mailtally-server")]
#[command(about = "Ingest mail archives and report sender statistics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to a mailtally.toml (overrides discovery)
    #[arg(long, env = "MAILTALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one .tar.gz archive synchronously and print the results
    Ingest {
        /// Archive to read
        archive: PathBuf,

        /// Number of top senders to print (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    if let Some(command) = cli.command {
        match command {
            Command::Ingest { archive, limit } => {
                return run_ingest(config, archive, limit).await;
            }
        }
    }

    run_server(config).await
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Arc<Config>> {
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    // Override via RUST_LOG.
                    "info,ingest::summary=info,tower_http=warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        ingestion.top_senders_limit = config.ingestion.top_senders_limit.get(),
        ingestion.spool_dir = ?config.ingestion.spool_dir,
        server.max_upload_bytes = config.server.max_upload_bytes,
        "ingestion configuration in effect"
    );

    Ok(Arc::new(config))
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&config));
    let router = create_app(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "Starting Mailtally Server (HTTP) on {}",
        listener.local_addr().map_or(addr, |a| a.to_string())
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn run_ingest(
    config: Arc<Config>,
    archive: PathBuf,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&config));
    let ticket = state
        .ingestion
        .start_file(&archive)
        .with_context(|| format!("failed to ingest {}", archive.display()))?;
    let report = ticket.wait().await.context("ingestion worker failed")?;

    let limit = limit.unwrap_or_else(|| state.reporting.default_limit());
    let top = state
        .reporting
        .top_senders(limit)
        .context("invalid --limit")?;

    let output = json!({
        "status": report,
        "topSenders": top,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
