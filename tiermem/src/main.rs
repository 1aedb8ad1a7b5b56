//! tiermem - Tiered Memory Store CLI
//!
//! Store, search and maintain short-term, working and long-term memory
//! kept as JSON files under a local data directory.

use anyhow::{Context, Result};
use clap::Parser;
use tiermem_sdk::MemorySystem;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};
use commands::search::{SearchArgs, SearchMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("tiermem=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("tiermem {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let config = config::Config::load()?;
    let mut memory = MemorySystem::open(config.memory_config())
        .await
        .context("Failed to open memory store")?;

    // Execute command
    match cli.command {
        Commands::Store {
            tier,
            key,
            payload,
            session,
            item_type,
            compress,
        } => commands::store::store(&memory, tier, &key, &payload, session, item_type, compress).await,
        Commands::Get { tier, key, compressed } => commands::store::get(&memory, tier, &key, compressed).await,
        Commands::Search {
            text,
            pattern,
            fields,
            tiers,
            limit,
            min_score,
            parallel,
            stream,
        } => {
            let mode = if stream {
                SearchMode::Stream
            } else if parallel {
                SearchMode::Parallel
            } else {
                SearchMode::Sequential
            };
            let args = SearchArgs {
                text,
                pattern,
                fields,
                tiers,
                limit,
                min_score,
                mode,
            };
            commands::search::execute(&memory, args).await
        }
        Commands::Remove { tier, key } => commands::store::remove(&memory, tier, &key).await,
        Commands::Optimize => commands::maintain::optimize(&memory).await,
        Commands::Sweep => commands::maintain::sweep(&memory).await,
        Commands::Reindex => commands::maintain::reindex(&memory).await,
        Commands::Stats { json } => commands::maintain::stats(&memory, json).await,
        Commands::Daemon => commands::maintain::daemon(&mut memory).await,
        Commands::Version => Ok(()),
    }
}
