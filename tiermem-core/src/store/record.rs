//! On-disk item format.
//!
//! One JSON file per item: `{data, timestamp, [session_id, merged_from | metadata]}`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{LongTermMetadata, MemoryItem, MemoryTier, TierMetadata};
use crate::value::Value;

/// File extension for item files
pub const ITEM_EXTENSION: &str = "json";

/// Session id assumed for working records written without one
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Serialize, Deserialize)]
struct ItemRecord {
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merged_from: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<LongTermMetadata>,
}

/// Serialize an item to the bytes of its file.
pub(crate) fn encode_item(item: &MemoryItem) -> Result<Vec<u8>> {
    let data = item
        .payload
        .to_json()
        .ok_or_else(|| Error::validation(format!("payload of {} has no text form", item.key)))?;

    let mut record = ItemRecord {
        data,
        timestamp: item.timestamp,
        session_id: None,
        merged_from: None,
        metadata: None,
    };
    match &item.metadata {
        TierMetadata::ShortTerm => {}
        TierMetadata::Working { session_id, merged_from } => {
            record.session_id = Some(session_id.clone());
            record.merged_from = *merged_from;
        }
        TierMetadata::LongTerm(metadata) => record.metadata = Some(metadata.clone()),
    }

    Ok(serde_json::to_vec(&record)?)
}

/// Parse the bytes of an item file.
pub(crate) fn decode_item(bytes: &[u8], tier: MemoryTier, key: &str, default_version: &str) -> Result<MemoryItem> {
    let record: ItemRecord = serde_json::from_slice(bytes)?;
    let payload = Value::from(record.data);

    let metadata = match tier {
        MemoryTier::ShortTerm => TierMetadata::ShortTerm,
        MemoryTier::Working => TierMetadata::Working {
            session_id: record.session_id.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
            merged_from: record.merged_from,
        },
        MemoryTier::LongTerm => TierMetadata::LongTerm(record.metadata.unwrap_or_else(|| LongTermMetadata {
            item_type: payload.kind_name().to_string(),
            version: default_version.to_string(),
        })),
    };

    Ok(MemoryItem {
        key: key.to_string(),
        payload,
        timestamp: record.timestamp,
        metadata,
    })
}

/// Item key for a directory entry, or `None` for index/temp/foreign files.
pub(crate) fn key_for_file(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let stem = name.strip_suffix(ITEM_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() { None } else { Some(stem.to_string()) }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("item");
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Write a file by renaming a fully written temp file over it.
///
/// Readers see either the old contents or the new, never a partial write.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path(path);
    tokio::fs::write(&temp, bytes).await?;

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}
