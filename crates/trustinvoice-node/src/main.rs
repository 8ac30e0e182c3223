//! TrustInvoice Node: entry point.
//!
//! Starts the settlement node with configuration from a TOML file or defaults.

mod api;
mod config;
mod node;
mod state;

use clap::Parser;
use std::path::PathBuf;
use trustinvoice_core::Blockchain;
use tracing_subscriber::EnvFilter;

use config::NodeConfig;
use node::TrustInvoiceNode;

/// TrustInvoice Node
#[derive(Parser, Debug)]
#[command(name = "trustinvoice-node", version, about = "TrustInvoice settlement node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "trustinvoice.toml")]
    config: PathBuf,

    /// Override the API port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the chain that is active at startup.
    #[arg(long)]
    chain: Option<Blockchain>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        NodeConfig::default().save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = NodeConfig::load(&args.config)?;

    // Apply CLI overrides
    if let Some(api_port) = args.api_port {
        config.api.port = api_port;
    }
    if let Some(chain) = args.chain {
        config.engine.default_chain = chain;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("TrustInvoice Node v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        chain = %config.engine.default_chain,
        fee_bps = config.engine.fee_bps,
        "starting settlement engine"
    );

    let node = TrustInvoiceNode::new(config).await?;

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server error");
                return Err(e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("received shutdown signal"),
                Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
            }
        }
    }

    tracing::info!("TrustInvoice node exited cleanly");
    Ok(())
}
