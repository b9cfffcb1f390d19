//! MSU.io Marketplace Sniper CLI
//!
//! Watches the MSU.io marketplace and buys matching listings unattended.

use anyhow::Result;
use clap::{Parser, Subcommand};
use msu_sniper::{
    Buyer, Config, MarketClient, OrderSigner, PriceStats, SessionManager, WatchEngine, WatchMode,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "msu-sniper")]
#[command(about = "Marketplace sniper for MSU.io")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch recently listed pets and buy skill-set matches
    Pets,

    /// Watch recently listed equipment and buy watchlist matches
    Equipment,

    /// Show price statistics for a named item (read-only)
    Query {
        /// Item name to look up
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Pets => watch(&config, WatchMode::Pets).await?,
        Commands::Equipment => watch(&config, WatchMode::Equipment).await?,
        Commands::Query { name } => query(&config, &name).await?,
    }

    Ok(())
}

async fn watch(config: &Config, mode: WatchMode) -> Result<()> {
    let (label, rules) = match mode {
        WatchMode::Pets => ("PET WATCH", config.pet_rules.clone()),
        WatchMode::Equipment => ("EQUIPMENT WATCH", config.equipment_rules.clone()),
    };
    if rules.is_empty() {
        anyhow::bail!("no rules configured for this mode");
    }

    println!("\n{}", "=".repeat(70));
    println!("  MSU MARKETPLACE SNIPER - {}", label);
    println!("  Wallet: {}", config.wallet);
    println!("  Poll interval: {}s", config.poll_interval_secs);
    println!("{}\n", "=".repeat(70));

    let sessions = Arc::new(SessionManager::new(config)?);
    let market = MarketClient::new(sessions.clone());
    let signer = OrderSigner::new(config)?;
    let buyer = Buyer::new(sessions, signer);

    let mut engine = WatchEngine::new(
        market,
        buyer,
        mode,
        rules,
        config.wallet.clone(),
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_millis(config.item_pacing_ms),
    );

    tokio::select! {
        _ = engine.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn query(config: &Config, name: &str) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  PRICE CHECK: {}", name);
    println!("{}\n", "=".repeat(70));

    let sessions = Arc::new(SessionManager::new(config)?);
    let market = MarketClient::new(sessions);

    let listings = market.query_listings(name).await?;
    println!("Found {} listings\n", listings.len());

    match PriceStats::from_listings(&listings) {
        Some(stats) => println!("{}\n", stats),
        None => println!("Not enough listings to analyze\n"),
    }

    Ok(())
}
