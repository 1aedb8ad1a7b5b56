//! Maintenance commands: optimize, sweep, reindex, stats and the daemon.

use anyhow::{Context, Result};
use colored::Colorize;
use tiermem_sdk::MemorySystem;
use tiermem_sdk::utils::{format_datetime, now_utc};
use tracing::info;

/// Deduplicate, merge sessions and rebuild the long-term index.
pub async fn optimize(memory: &MemorySystem) -> Result<()> {
    let report = memory.optimize().await.context("Optimization failed")?;

    println!("{} Optimized memory", "✓".green());
    println!("  Duplicates removed: {}", report.duplicates_removed);
    println!(
        "  Sessions merged:    {} ({} records)",
        report.sessions_merged, report.records_merged
    );
    println!("  Indexed:            {}", report.indexed);
    Ok(())
}

/// Evict expired items now.
pub async fn sweep(memory: &MemorySystem) -> Result<()> {
    let report = memory.sweep_expired().await;

    println!("{} Swept expired items", "✓".green());
    println!("  Short-term evicted: {}", report.short_term_evicted);
    println!("  Working evicted:    {}", report.working_evicted);
    Ok(())
}

/// Rebuild the long-term index.
pub async fn reindex(memory: &MemorySystem) -> Result<()> {
    let indexed = memory.reindex().await.context("Reindex failed")?;
    println!("{} Indexed {} long-term items", "✓".green(), indexed);
    Ok(())
}

/// Show item counts per tier.
pub async fn stats(memory: &MemorySystem, json: bool) -> Result<()> {
    let stats = memory.stats().await.context("Failed to read memory stats")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Memory Statistics".bold());
    println!("  Base path:  {}", memory.config().base_path.display());
    println!("  Short-term: {}", stats.short_term);
    println!("  Working:    {}", stats.working);
    println!("  Long-term:  {} ({} indexed)", stats.long_term, stats.indexed);
    println!("  Total:      {}", stats.total().to_string().cyan());
    Ok(())
}

/// Run the maintenance loop in the foreground until Ctrl-C.
pub async fn daemon(memory: &mut MemorySystem) -> Result<()> {
    memory.start_maintenance();

    let interval = memory.config().maintenance_interval_secs;
    println!(
        "{} Maintenance running every {}s since {} (Ctrl-C to stop)",
        "→".cyan(),
        interval,
        format_datetime(&now_utc())
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested");
    memory.stop_maintenance().await;
    println!("{} Maintenance stopped", "✓".green());
    Ok(())
}
