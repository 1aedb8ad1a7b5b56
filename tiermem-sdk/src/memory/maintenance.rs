//! Memory maintenance.
//!
//! - TTL eviction for the short-term and working tiers
//! - Short-term compaction (duplicate payloads collapse to the first seen)
//! - Working-tier session merge (one record per session)
//! - Long-term reindex
//!
//! Every pass re-reads disk state and only deletes an item after checking it
//! is still the version that was inspected, so a pass can run alongside
//! client writes and be repeated safely.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tiermem_core::{MemoryItem, MemoryTier, TierMetadata, TierStore, Value};

use super::tiers::TierSet;
use crate::config::MemoryConfig;
use crate::error::SdkResult;
use crate::utils::{is_expired, payload_hash};

pub use tiermem_core::validation::MERGED_PREFIX;

/// Items evicted by one TTL sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub short_term_evicted: usize,
    pub working_evicted: usize,
}

/// Outcome of one `optimize()` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    /// Short-term items dropped as duplicates
    pub duplicates_removed: usize,
    /// Sessions folded into a merged record
    pub sessions_merged: usize,
    /// Working items deleted after being merged
    pub records_merged: usize,
    /// Long-term items in the rebuilt index
    pub indexed: usize,
}

/// One eviction pass against `now`.
///
/// Failures are logged per tier and per item; a failing tier does not stop
/// the next one.
pub(crate) async fn sweep_expired(tiers: &TierSet, config: &MemoryConfig, now: DateTime<Utc>) -> MaintenanceReport {
    let report = MaintenanceReport {
        short_term_evicted: sweep_tier(tiers.get(MemoryTier::ShortTerm), config.short_term_ttl(), now).await,
        working_evicted: sweep_tier(tiers.get(MemoryTier::Working), config.working_ttl(), now).await,
    };

    if report.short_term_evicted + report.working_evicted > 0 {
        info!(
            short_term = report.short_term_evicted,
            working = report.working_evicted,
            "Evicted expired items"
        );
    }
    report
}

async fn sweep_tier(store: &TierStore, ttl: Duration, now: DateTime<Utc>) -> usize {
    let items = match store.load_all().await {
        Ok(items) => items,
        Err(e) => {
            warn!(tier = %store.tier(), error = %e, "Failed to scan tier for expired items");
            return 0;
        }
    };

    let mut evicted = 0;
    for item in items.into_iter().filter(|item| is_expired(item.timestamp, ttl, now)) {
        // Re-check against the current file so a fresh write is never evicted
        match store
            .remove_if(&item.key, |current| is_expired(current.timestamp, ttl, now))
            .await
        {
            Ok(true) => {
                debug!(tier = %store.tier(), key = %item.key, "Evicted expired item");
                evicted += 1;
            }
            Ok(false) => {}
            Err(e) => warn!(tier = %store.tier(), key = %item.key, error = %e, "Failed to evict item"),
        }
    }
    evicted
}

/// Compaction, session merge and reindex, in that order.
pub(crate) async fn optimize(tiers: &TierSet) -> SdkResult<OptimizeReport> {
    let duplicates_removed = compact_short_term(tiers.get(MemoryTier::ShortTerm)).await?;
    let (sessions_merged, records_merged) = merge_sessions(tiers.get(MemoryTier::Working)).await?;
    let indexed = tiers.get(MemoryTier::LongTerm).reindex().await?;

    let report = OptimizeReport {
        duplicates_removed,
        sessions_merged,
        records_merged,
        indexed,
    };
    info!(
        duplicates_removed,
        sessions_merged,
        records_merged,
        indexed,
        "Memory optimization complete"
    );
    Ok(report)
}

/// Drop short-term items whose payload serializes identically to an
/// earlier one.
async fn compact_short_term(store: &TierStore) -> SdkResult<usize> {
    let mut items = store.load_all().await?;
    items.sort_by(|a, b| (a.timestamp, &a.key).cmp(&(b.timestamp, &b.key)));

    let mut seen = HashSet::new();
    let mut removed = 0;
    for item in items {
        let Some(hash) = payload_hash(&item.payload) else {
            continue;
        };
        if seen.insert(hash) {
            continue;
        }

        match store
            .remove_if(&item.key, |current| {
                current.timestamp == item.timestamp && current.payload == item.payload
            })
            .await
        {
            Ok(true) => {
                debug!(key = %item.key, "Removed duplicate short-term item");
                removed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!(key = %item.key, error = %e, "Failed to remove duplicate item"),
        }
    }
    Ok(removed)
}

/// Fold every session with more than one working item into
/// `merged_<session>`. Returns (sessions merged, originals deleted).
async fn merge_sessions(store: &TierStore) -> SdkResult<(usize, usize)> {
    let mut sessions: BTreeMap<String, Vec<MemoryItem>> = BTreeMap::new();
    for item in store.load_all().await? {
        if let Some(session_id) = item.metadata.session_id() {
            sessions.entry(session_id.to_string()).or_default().push(item);
        }
    }

    let mut sessions_merged = 0;
    let mut records_merged = 0;
    for (session_id, mut items) in sessions {
        if items.len() < 2 {
            continue;
        }
        items.sort_by(|a, b| (a.timestamp, &a.key).cmp(&(b.timestamp, &b.key)));

        let merged = merge_items(&session_id, &items);
        let merged_key = merged.key.clone();
        // The merged key may already hold an item of another session.
        let owned = |current: Option<&MemoryItem>| {
            current.is_none_or(|item| item.metadata.session_id() == Some(session_id.as_str()))
        };
        match store.rewrite_if(merged, owned).await {
            Ok(true) => sessions_merged += 1,
            Ok(false) => {
                warn!(session_id = %session_id, key = %merged_key, "Merged key belongs to another session, skipping merge");
                continue;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to write merged session record");
                continue;
            }
        }

        for item in items.iter().filter(|item| item.key != merged_key) {
            match store
                .remove_if(&item.key, |current| current.timestamp == item.timestamp)
                .await
            {
                Ok(true) => records_merged += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %item.key, error = %e, "Failed to remove merged item"),
            }
        }
        debug!(session_id = %session_id, items = items.len(), "Merged session");
    }

    Ok((sessions_merged, records_merged))
}

/// Merged record for one session; `items` are in encounter order.
fn merge_items(session_id: &str, items: &[MemoryItem]) -> MemoryItem {
    let mut payload: Option<Value> = None;
    let mut merged_from = 0;
    let mut timestamp = DateTime::<Utc>::MIN_UTC;

    for item in items {
        payload = Some(match payload {
            Some(acc) => fold_payload(acc, item.payload.clone()),
            None => item.payload.clone(),
        });
        merged_from += match &item.metadata {
            TierMetadata::Working {
                merged_from: Some(n), ..
            } => *n,
            _ => 1,
        };
        timestamp = timestamp.max(item.timestamp);
    }

    MemoryItem {
        key: format!("{}{}", MERGED_PREFIX, session_id),
        payload: payload.unwrap_or(Value::Null),
        timestamp,
        metadata: TierMetadata::Working {
            session_id: session_id.to_string(),
            merged_from: Some(merged_from),
        },
    }
}

/// Mappings merge field by field (later wins), sequences concatenate,
/// anything else is replaced by the later value.
fn fold_payload(acc: Value, next: Value) -> Value {
    match (acc, next) {
        (Value::Map(mut acc), Value::Map(next)) => {
            acc.extend(next);
            Value::Map(acc)
        }
        (Value::Seq(mut acc), Value::Seq(next)) => {
            acc.extend(next);
            Value::Seq(acc)
        }
        (_, next) => next,
    }
}

/// Handle to a running maintenance loop.
pub(crate) struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawn the interval loop. The first sweep runs immediately.
    pub fn spawn(tiers: TierSet, config: MemoryConfig) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval = config.maintenance_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_expired(&tiers, &config, Utc::now()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        // Sender dropped or stop requested
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "Maintenance loop started");
        Self { shutdown, task }
    }

    /// Signal the loop and wait for it to finish its current pass.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Maintenance loop ended abnormally");
        }
        info!("Maintenance loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn working(key: &str, session: &str, payload: serde_json::Value, age_secs: i64) -> MemoryItem {
        MemoryItem {
            key: key.into(),
            payload: Value::from(payload),
            timestamp: Utc::now() - ChronoDuration::seconds(age_secs),
            metadata: TierMetadata::Working {
                session_id: session.into(),
                merged_from: None,
            },
        }
    }

    #[test]
    fn test_fold_payload() {
        let map = fold_payload(Value::from(json!({"a": 1, "b": 2})), Value::from(json!({"a": 3})));
        assert_eq!(map, Value::from(json!({"a": 3, "b": 2})));

        let seq = fold_payload(Value::from(json!([1])), Value::from(json!([2, 3])));
        assert_eq!(seq, Value::from(json!([1, 2, 3])));

        let mixed = fold_payload(Value::from(json!({"a": 1})), Value::from(json!("text")));
        assert_eq!(mixed, Value::from("text"));
    }

    #[test]
    fn test_merge_items() {
        let items = vec![
            working("w1", "s", json!({"a": 1}), 30),
            working("w2", "s", json!({"b": 2}), 20),
            working("w3", "s", json!({"a": 3}), 10),
        ];
        let merged = merge_items("s", &items);

        assert_eq!(merged.key, "merged_s");
        assert_eq!(merged.payload, Value::from(json!({"a": 3, "b": 2})));
        assert_eq!(merged.timestamp, items[2].timestamp);
        assert_eq!(
            merged.metadata,
            TierMetadata::Working {
                session_id: "s".into(),
                merged_from: Some(3),
            }
        );
    }

    #[test]
    fn test_merge_counts_previous_merges() {
        let mut previous = working("merged_s", "s", json!([1, 2]), 30);
        previous.metadata = TierMetadata::Working {
            session_id: "s".into(),
            merged_from: Some(4),
        };
        let merged = merge_items("s", &[previous, working("w9", "s", json!([3]), 5)]);

        assert_eq!(merged.payload, Value::from(json!([1, 2, 3])));
        assert!(matches!(merged.metadata, TierMetadata::Working { merged_from: Some(5), .. }));
    }
}
