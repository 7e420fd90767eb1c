//! cosmindex — Cosmos-SDK chain data aggregator and exporter.
//!
//! ```bash
//! cosmindex init  --config ./cosmindex.yaml        # write the default config
//! cosmindex start --config ./cosmindex.yaml        # run the ingestion engine
//! ```
//!
//! Exit codes: 0 on clean (signal-triggered) shutdown, non-zero on any
//! startup failure or fatal scheduler error.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cosmindex_core::{Dispatcher, IngestContext, Supervisor};
use cosmindex_node::{RemoteNode, RemoteNodeConfig};
use cosmindex_rewards::RewardEventHandler;
use cosmindex_storage::postgres::{PostgresOptions, PostgresStore};
use cosmindex_wasm::{WasmGenesisHandler, WasmMessageHandler};

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "cosmindex",
    about = "Cosmos-SDK chain data aggregator and exporter",
    long_about = "cosmindex walks a chain's block history and exports blocks, \
CosmWasm contract lifecycle events, and gas-reward accounting into PostgreSQL.",
    version
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, default_value = "cosmindex.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Start ingesting chain data
    Start,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => cmd_init(&cli.config, force),
        Commands::Start => cmd_start(&cli.config).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn cmd_init(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    AppConfig::write_default(path, force)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_start(path: &std::path::Path) -> anyhow::Result<()> {
    let app = AppConfig::load(path)?;
    init_tracing(&app.logging)?;

    tracing::info!(config = %path.display(), "cosmindex starting");

    let store = PostgresStore::connect_with_options(
        &app.database.url,
        PostgresOptions {
            max_connections: app.database.max_connections,
            ..Default::default()
        },
    )
    .await
    .context("failed to connect to the database")?;

    let node = RemoteNode::new(RemoteNodeConfig {
        rpc_url: app.node.rpc_url.clone(),
        api_url: app.node.api_url.clone(),
        timeout_secs: app.node.timeout_secs,
        ..Default::default()
    })
    .context("failed to build the node client")?;

    let mut dispatcher = Dispatcher::new();
    dispatcher.on_message(Arc::new(WasmMessageHandler::new()));
    dispatcher.on_event(Arc::new(RewardEventHandler::new()));
    dispatcher.on_genesis(Arc::new(WasmGenesisHandler::new()));

    let ctx = IngestContext::new(app.parsing, Arc::new(node), Arc::new(store), dispatcher);
    Supervisor::new(ctx)
        .run()
        .await
        .context("ingestion terminated")?;
    Ok(())
}

fn init_tracing(logging: &config::LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&logging.level)
        .with_context(|| format!("invalid logging level '{}'", logging.level))?;

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        "plain" => tracing_subscriber::fmt().with_env_filter(filter).init(),
        other => anyhow::bail!("invalid logging format '{other}' (expected plain or json)"),
    }
    Ok(())
}
