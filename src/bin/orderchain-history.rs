#![forbid(unsafe_code)]
//! Print the persisted chain, the trades it settled and the resulting balances.

use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use orderchain::blockchain::Blockchain;
use orderchain::config::load_config;
use orderchain::matching::MatchingEngine;
use orderchain::persistence::Database;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Also list every trade, by the block it was matched from
    #[arg(long)]
    trades: bool,

    /// Print the chain snapshot as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn short(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}...", &hash[..13])
    } else {
        hash.to_string()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold).fg(Color::Cyan))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let db = Database::open(&config.database.path)?;
    let chain = Blockchain::with_persistence(config.consensus.clone(), &config.node.client_id, Box::new(db))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&chain.snapshot())?);
        return Ok(());
    }

    let mut blocks = Table::new();
    blocks
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Height", "Hash", "Prev", "Miner", "Nonce", "Orders", "Balances"]));

    for (height, block) in chain.blocks().iter().enumerate() {
        blocks.add_row(vec![
            Cell::new(height),
            Cell::new(short(&block.hash()?)).fg(Color::Green),
            Cell::new(block.body.prev_block_hash.as_deref().map(short).unwrap_or_else(|| "-".to_string())),
            Cell::new(&block.client_id),
            Cell::new(block.nonce),
            Cell::new(block.body.orders.len()),
            Cell::new(block.body.balances.len()),
        ]);
    }
    println!("{blocks}");

    if cli.trades {
        let engine = MatchingEngine::new(&config.consensus);
        let mut trades = Table::new();
        trades
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header(&[
                "From block",
                "Asset",
                "Buyer",
                "Seller",
                "Quantity",
                format!("Price ({})", engine.currency()).as_str(),
            ]));

        for (height, block) in chain.blocks().iter().enumerate() {
            for trade in engine.match_block_with_trades(block)?.trades {
                trades.add_row(vec![
                    Cell::new(height),
                    Cell::new(&trade.asset),
                    Cell::new(&trade.buyer),
                    Cell::new(&trade.seller),
                    Cell::new(trade.quantity),
                    Cell::new(trade.price),
                ]);
            }
        }
        println!("{trades}");
    }

    let mut balances = Table::new();
    balances
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Client", "Asset", "Quantity"]));
    for balance in &chain.current().balances {
        let color = if balance.quantity < 0 { Color::Red } else { Color::Green };
        balances.add_row(vec![
            Cell::new(&balance.client_id),
            Cell::new(&balance.asset),
            Cell::new(balance.quantity).fg(color),
        ]);
    }
    println!("{balances}");
    println!(
        "height {} | {} open orders | difficulty {}",
        chain.height(),
        chain.current().orders.len(),
        config.consensus.difficulty
    );

    Ok(())
}
