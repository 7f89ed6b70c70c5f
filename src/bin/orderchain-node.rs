#![forbid(unsafe_code)]
//! OrderChain node: reads orders as JSON lines on stdin and mines them into the chain.
//!
//! ```text
//! echo '{"id":"1","clientId":"Ada","side":"BUY","asset":"ETH","quantity":10,"price":2}' | orderchain-node
//! ```

use clap::Parser;
use orderchain::blockchain::Blockchain;
use orderchain::config::load_config;
use orderchain::node::{self, Node, NodeHandle, NullTransport};
use orderchain::order::Order;
use orderchain::persistence::{Database, InMemoryPersistence, Persistence};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override `node.client_id`
    #[arg(long)]
    client_id: Option<String>,

    /// Keep the chain in memory instead of the configured database
    #[arg(long)]
    ephemeral: bool,

    /// Validate and relay only
    #[arg(long)]
    no_mine: bool,
}

async fn read_orders(handle: NodeHandle) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Order>(line) {
            Ok(order) => {
                if handle.submit_order(order).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed order"),
        }
    }
    info!("stdin closed, no more orders");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(client_id) = cli.client_id {
        config.node.client_id = client_id;
        config.validate()?;
    }

    let persistence: Box<dyn Persistence> = if cli.ephemeral {
        Box::new(InMemoryPersistence::new())
    } else {
        match Database::open(&config.database.path) {
            Ok(db) => Box::new(db),
            Err(e) => {
                warn!(
                    path = %config.database.path,
                    error = %e,
                    "failed to open database, falling back to in-memory persistence"
                );
                Box::new(InMemoryPersistence::new())
            }
        }
    };

    let blockchain = Blockchain::with_persistence(config.consensus.clone(), &config.node.client_id, persistence)?;

    let (handle, inbox) = node::channel();
    let node = Node::new(
        blockchain,
        NullTransport,
        inbox,
        Duration::from_millis(config.node.tick_interval_ms),
    )
    .with_mining(config.node.mining_enabled && !cli.no_mine);
    let node_task = tokio::spawn(node.run());

    let reader = tokio::spawn(read_orders(handle.clone()));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    reader.abort();
    handle.shutdown()?;

    let node = node_task.await?;
    let summary = serde_json::json!({
        "height": node.blockchain().height(),
        "headHash": node.blockchain().head_hash()?,
        "stats": node.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
