//! Store, get and remove commands.

use anyhow::{Context, Result};
use colored::Colorize;
use tiermem_sdk::utils::format_datetime;
use tiermem_sdk::{MemorySystem, MemoryTier, StoreOptions, TierMetadata};

use super::{parse_payload, render};

/// Store a payload.
pub async fn store(
    memory: &MemorySystem,
    tier: MemoryTier,
    key: &str,
    payload: &str,
    session: Option<String>,
    item_type: Option<String>,
    compress: bool,
) -> Result<()> {
    let payload = parse_payload(payload)?;
    let options = StoreOptions {
        session_id: session,
        item_type,
    };

    if compress {
        let envelope = memory
            .store_compressed(tier, key, &payload, &options)
            .await
            .context("Failed to store compressed item")?;
        println!("{} Stored {} in {} memory", "✓".green(), key.bold(), tier.to_string().cyan());
        println!(
            "  Encoding: {:?} ({} bytes, compressed: {})",
            envelope.encoding, envelope.original_size, envelope.compressed
        );
    } else {
        let item = memory
            .store(tier, key, payload, &options)
            .await
            .context("Failed to store item")?;
        println!("{} Stored {} in {} memory", "✓".green(), key.bold(), tier.to_string().cyan());
        println!("  At: {}", format_datetime(&item.timestamp));
        match &item.metadata {
            TierMetadata::Working { session_id, .. } => println!("  Session: {}", session_id),
            TierMetadata::LongTerm(meta) => println!("  Type: {} (v{})", meta.item_type, meta.version),
            TierMetadata::ShortTerm => {}
        }
    }

    Ok(())
}

/// Print a stored payload.
pub async fn get(memory: &MemorySystem, tier: MemoryTier, key: &str, compressed: bool) -> Result<()> {
    let payload = if compressed {
        memory.retrieve_compressed(tier, key).await
    } else {
        memory.retrieve(tier, key).await
    }
    .context("Failed to retrieve item")?;

    match payload {
        Some(payload) => println!("{}", render(&payload)),
        None => println!("{}", format!("No item {} in {} memory", key, tier).yellow()),
    }
    Ok(())
}

/// Delete an item.
pub async fn remove(memory: &MemorySystem, tier: MemoryTier, key: &str) -> Result<()> {
    if memory.remove(tier, key).await.context("Failed to remove item")? {
        println!("{} Removed {} from {} memory", "✓".green(), key.bold(), tier.to_string().cyan());
    } else {
        println!("{}", format!("No item {} in {} memory", key, tier).yellow());
    }
    Ok(())
}
