//! Search coordination across tiers.
//!
//! Sequential search walks the selected tiers on the calling task. Fan-out
//! search runs one scan per tier on blocking worker threads; a semaphore
//! shared by the whole memory system caps concurrent scans at one per tier,
//! even across overlapping calls. Scan results flow back over a channel, so
//! they can be either collected or streamed to a [`ResultSink`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::debug;

use tiermem_core::search::sort_results;
use tiermem_core::{MemoryTier, Query, Scorer, SearchResult, TierStore};

use super::tiers::TierSet;
use crate::error::{SdkError, SdkResult};

/// Concurrent per-tier scans allowed system-wide
pub const SCAN_SLOTS: usize = MemoryTier::ALL.len();

/// Results buffered between scanners and the consumer
const RESULT_BUFFER: usize = 64;

/// Which tiers a search covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TierSelection {
    #[default]
    All,
    Only(Vec<MemoryTier>),
}

impl TierSelection {
    /// Selected tiers in scan order, without duplicates.
    pub fn tiers(&self) -> Vec<MemoryTier> {
        match self {
            Self::All => MemoryTier::ALL.to_vec(),
            Self::Only(tiers) => MemoryTier::ALL
                .into_iter()
                .filter(|tier| tiers.contains(tier))
                .collect(),
        }
    }
}

impl From<MemoryTier> for TierSelection {
    fn from(tier: MemoryTier) -> Self {
        Self::Only(vec![tier])
    }
}

impl From<Vec<MemoryTier>> for TierSelection {
    fn from(tiers: Vec<MemoryTier>) -> Self {
        if tiers.is_empty() { Self::All } else { Self::Only(tiers) }
    }
}

/// Receives streamed search results.
///
/// Returning an error stops delivery; the error is surfaced to the caller
/// as [`SdkError::SearchCallback`].
#[async_trait]
pub trait ResultSink: Send {
    async fn deliver(&mut self, result: SearchResult) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> ResultSink for F
where
    F: FnMut(SearchResult) -> anyhow::Result<()> + Send,
{
    async fn deliver(&mut self, result: SearchResult) -> anyhow::Result<()> {
        self(result)
    }
}

/// Scan the selected tiers one after another and keep every item with a
/// positive score.
pub(crate) async fn search_sequential(
    tiers: &TierSet,
    scorer: Scorer,
    query: &Query,
    selection: &TierSelection,
    limit: usize,
) -> SdkResult<Vec<SearchResult>> {
    let mut results = Vec::new();
    for tier in selection.tiers() {
        for item in tiers.get(tier).load_all().await? {
            let score = scorer.score(query, &item.payload);
            if score > 0.0 {
                results.push(SearchResult::from_item(item, score));
            }
        }
    }

    sort_results(&mut results);
    results.truncate(limit);
    Ok(results)
}

/// Fan-out scan; returns the best `limit` results with score >= `min_score`.
pub(crate) async fn search_parallel(
    tiers: &TierSet,
    slots: &Arc<Semaphore>,
    scorer: Scorer,
    query: &Query,
    selection: &TierSelection,
    limit: usize,
    min_score: f64,
) -> SdkResult<Vec<SearchResult>> {
    let (tx, mut rx) = mpsc::channel(RESULT_BUFFER);
    let mut scans = spawn_scans(tiers, slots, scorer, query, selection, min_score, tx);

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    join_scans(&mut scans).await?;

    sort_results(&mut results);
    results.truncate(limit);
    debug!(query = query.kind(), results = results.len(), "Parallel search finished");
    Ok(results)
}

/// Fan-out scan delivering each qualifying result to `sink` as it arrives.
///
/// Returns the number of results delivered. A sink failure stops delivery
/// at once; scans already running finish in the background and their
/// remaining results are dropped.
pub(crate) async fn search_streaming(
    tiers: &TierSet,
    slots: &Arc<Semaphore>,
    scorer: Scorer,
    query: &Query,
    selection: &TierSelection,
    min_score: f64,
    sink: &mut dyn ResultSink,
) -> SdkResult<usize> {
    let (tx, mut rx) = mpsc::channel(RESULT_BUFFER);
    let mut scans = spawn_scans(tiers, slots, scorer, query, selection, min_score, tx);

    let mut delivered = 0;
    while let Some(result) = rx.recv().await {
        if let Err(e) = sink.deliver(result).await {
            debug!(query = query.kind(), delivered, "Search callback failed, aborting delivery");
            return Err(SdkError::SearchCallback(e));
        }
        delivered += 1;
    }
    join_scans(&mut scans).await?;

    Ok(delivered)
}

fn spawn_scans(
    tiers: &TierSet,
    slots: &Arc<Semaphore>,
    scorer: Scorer,
    query: &Query,
    selection: &TierSelection,
    min_score: f64,
    tx: mpsc::Sender<SearchResult>,
) -> JoinSet<SdkResult<usize>> {
    let query = Arc::new(query.clone());
    let mut scans = JoinSet::new();

    for tier in selection.tiers() {
        let store = Arc::clone(tiers.get(tier));
        let slots = Arc::clone(slots);
        let query = Arc::clone(&query);
        let tx = tx.clone();

        scans.spawn(async move {
            // The semaphore is never closed; a failed acquire just runs unthrottled
            let permit = slots.acquire_owned().await.ok();
            let sent = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scan_tier(&store, scorer, &query, min_score, &tx)
            })
            .await??;
            Ok::<_, SdkError>(sent)
        });
    }

    scans
}

async fn join_scans(scans: &mut JoinSet<SdkResult<usize>>) -> SdkResult<()> {
    while let Some(joined) = scans.join_next().await {
        joined??;
    }
    Ok(())
}

/// Score every item of one tier, sending those at or above `min_score`.
fn scan_tier(
    store: &TierStore,
    scorer: Scorer,
    query: &Query,
    min_score: f64,
    tx: &mpsc::Sender<SearchResult>,
) -> SdkResult<usize> {
    let mut sent = 0;
    for item in store.scan_blocking()? {
        let score = scorer.score(query, &item.payload);
        if score >= min_score {
            // A closed channel means the consumer gave up; finish the scan anyway
            if tx.blocking_send(SearchResult::from_item(item, score)).is_ok() {
                sent += 1;
            }
        }
    }
    debug!(tier = %store.tier(), sent, "Tier scan finished");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_selection() {
        assert_eq!(TierSelection::All.tiers(), MemoryTier::ALL.to_vec());
        assert_eq!(
            TierSelection::Only(vec![MemoryTier::LongTerm, MemoryTier::ShortTerm, MemoryTier::LongTerm]).tiers(),
            vec![MemoryTier::ShortTerm, MemoryTier::LongTerm]
        );
        assert_eq!(TierSelection::from(MemoryTier::Working).tiers(), vec![MemoryTier::Working]);
        assert_eq!(TierSelection::from(Vec::new()), TierSelection::All);
    }
}
