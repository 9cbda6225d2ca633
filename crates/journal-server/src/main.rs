//! Journal relay server
//!
//! # Usage
//! ```bash
//! SERVICE_PRIVATE_KEY=... journal-server
//! journal-server --config journal.toml
//! journal-server --config journal.toml --check    # Validate config only
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use journal_core::{Initialization, JournalProgram, RpcGateway};
use journal_server::{create_router, AppState, ServerConfig};
use solana_wire::TransactionSigner;

/// Prepares and indexes journal program transactions
#[derive(Parser, Debug)]
#[command(name = "journal-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "JOURNAL_CONFIG")]
    config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    init_logging(&config.log_level);
    tracing::info!("journal-server v{}", env!("CARGO_PKG_VERSION"));

    if args.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    let service = Arc::new(config.service_keypair()?);
    let program = JournalProgram::new(config.program_id);
    let gateway = Arc::new(RpcGateway::new(config.rpc_config())?);

    tracing::info!(
        service = %service.pubkey(),
        program = %program.program_id,
        rpc = %config.rpc_url,
        commitment = %config.commitment,
        "ledger configured"
    );

    let state = AppState::new(program, gateway, service, config.max_compose_attempts);

    if config.initialize_counter_on_startup {
        match state.counter.initialize().await {
            Ok(Initialization::Initialized { counter, signature }) => {
                tracing::info!(%counter, %signature, "counter initialized on startup");
            }
            Ok(Initialization::AlreadyInitialized { counter, count }) => {
                tracing::info!(%counter, count, "counter present");
            }
            Err(e) => tracing::error!(error = %e, "startup counter initialization failed"),
        }
    }

    let app = create_router(state);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
