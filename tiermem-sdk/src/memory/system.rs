//! Memory System
//!
//! High-level interface over the three tier stores:
//! - Store/retrieve, plain or compressed
//! - Sequential, fan-out and streaming search
//! - TTL sweeps, optimization and a background maintenance loop
//! - Versioned schema migration

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use tiermem_core::{
    Compressor, Envelope, MemoryItem, MemoryTier, Query, Scorer, SearchResult, StoreOptions, TierStore, Value,
};

use super::coordinator::{self, ResultSink, SCAN_SLOTS, TierSelection};
use super::maintenance::{self, MaintenanceHandle, MaintenanceReport, OptimizeReport};
use super::tiers::TierSet;
use crate::config::MemoryConfig;
use crate::error::SdkResult;
use crate::migration::{self, MigrationPlanner, MigrationReport, VersionGraph};

/// Item counts per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub short_term: usize,
    pub working: usize,
    pub long_term: usize,
    /// Entries in the long-term index
    pub indexed: usize,
}

impl MemoryStats {
    pub fn total(&self) -> usize {
        self.short_term + self.working + self.long_term
    }
}

/// Tiered memory store.
///
/// Construct one per base directory and share it by reference; two systems
/// over the same directory do not coordinate writes.
pub struct MemorySystem {
    config: MemoryConfig,
    tiers: TierSet,
    compressor: Compressor,
    scorer: Scorer,
    search_slots: Arc<Semaphore>,
    migrations: VersionGraph,
    maintenance: Option<MaintenanceHandle>,
}

impl MemorySystem {
    /// Validate `config` and open the tier directories under its base path.
    pub async fn open(config: MemoryConfig) -> SdkResult<Self> {
        config.validate()?;
        let tiers = TierSet::open(&config.base_path, &config.schema_version).await?;

        info!(base_path = %config.base_path.display(), "Opened memory system");

        Ok(Self {
            compressor: Compressor::new(config.compression.clone()),
            scorer: Scorer::new(config.search.structured_threshold),
            search_slots: Arc::new(Semaphore::new(SCAN_SLOTS)),
            migrations: VersionGraph::new(),
            maintenance: None,
            tiers,
            config,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Direct access to one tier's store.
    pub fn tier(&self, tier: MemoryTier) -> &TierStore {
        self.tiers.get(tier)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Store / retrieve
    // ─────────────────────────────────────────────────────────────────────

    /// Store a payload. Working-tier items need `options.session_id`.
    pub async fn store(
        &self,
        tier: MemoryTier,
        key: &str,
        payload: Value,
        options: &StoreOptions,
    ) -> SdkResult<MemoryItem> {
        Ok(self.tiers.get(tier).store(key, payload, options).await?)
    }

    /// Payload under `key`, or `None` if absent.
    pub async fn retrieve(&self, tier: MemoryTier, key: &str) -> SdkResult<Option<Value>> {
        Ok(self.tiers.get(tier).retrieve(key).await?)
    }

    /// Full item under `key`, or `None` if absent.
    pub async fn retrieve_item(&self, tier: MemoryTier, key: &str) -> SdkResult<Option<MemoryItem>> {
        Ok(self.tiers.get(tier).retrieve_item(key).await?)
    }

    /// Delete the item under `key`. Returns whether it existed.
    pub async fn remove(&self, tier: MemoryTier, key: &str) -> SdkResult<bool> {
        Ok(self.tiers.get(tier).remove(key).await?)
    }

    /// Store a payload wrapped in a (possibly compressed) envelope.
    ///
    /// Accepts any value, including byte strings. The long-term `type`
    /// defaults to the kind of the wrapped payload.
    pub async fn store_compressed(
        &self,
        tier: MemoryTier,
        key: &str,
        payload: &Value,
        options: &StoreOptions,
    ) -> SdkResult<Envelope> {
        let envelope = self.compressor.compress(payload)?;

        let mut options = options.clone();
        if options.item_type.is_none() {
            options.item_type = Some(payload.kind_name().to_string());
        }
        self.tiers.get(tier).store(key, envelope.to_value()?, &options).await?;

        debug!(
            tier = %tier,
            key = %key,
            compressed = envelope.compressed,
            original_size = envelope.original_size,
            "Stored envelope"
        );
        Ok(envelope)
    }

    /// Retrieve and unwrap an envelope stored by
    /// [`store_compressed`](Self::store_compressed).
    ///
    /// Items that are not envelopes are returned as stored.
    pub async fn retrieve_compressed(&self, tier: MemoryTier, key: &str) -> SdkResult<Option<Value>> {
        let Some(stored) = self.tiers.get(tier).retrieve(key).await? else {
            return Ok(None);
        };
        if !Envelope::is_envelope(&stored) {
            return Ok(Some(stored));
        }

        let envelope = Envelope::from_value(&stored)?;
        Ok(Some(self.compressor.decompress(&envelope)?))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────

    /// Scan tiers one after another; every item scoring above zero qualifies.
    pub async fn search(
        &self,
        query: &Query,
        tiers: impl Into<TierSelection>,
        limit: Option<usize>,
    ) -> SdkResult<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.search.default_limit);
        coordinator::search_sequential(&self.tiers, self.scorer, query, &tiers.into(), limit).await
    }

    /// Scan tiers concurrently; the best `limit` results scoring at least
    /// `min_score`, sorted by score then recency.
    pub async fn parallel_search(
        &self,
        query: &Query,
        tiers: impl Into<TierSelection>,
        limit: Option<usize>,
        min_score: Option<f64>,
    ) -> SdkResult<Vec<SearchResult>> {
        coordinator::search_parallel(
            &self.tiers,
            &self.search_slots,
            self.scorer,
            query,
            &tiers.into(),
            limit.unwrap_or(self.config.search.default_limit),
            min_score.unwrap_or(self.config.search.default_min_score),
        )
        .await
    }

    /// Scan tiers concurrently, handing each qualifying result to `sink` as
    /// soon as it is scored. Returns how many results were delivered.
    ///
    /// The first sink error aborts delivery and is returned as
    /// [`SdkError::SearchCallback`](crate::SdkError::SearchCallback).
    pub async fn search_with_callback<S>(
        &self,
        query: &Query,
        mut sink: S,
        tiers: impl Into<TierSelection>,
        min_score: Option<f64>,
    ) -> SdkResult<usize>
    where
        S: ResultSink,
    {
        coordinator::search_streaming(
            &self.tiers,
            &self.search_slots,
            self.scorer,
            query,
            &tiers.into(),
            min_score.unwrap_or(self.config.search.default_min_score),
            &mut sink,
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Compact short-term, merge working sessions, rebuild the long-term index.
    pub async fn optimize(&self) -> SdkResult<OptimizeReport> {
        maintenance::optimize(&self.tiers).await
    }

    /// Rebuild the long-term index from the item files.
    pub async fn reindex(&self) -> SdkResult<usize> {
        Ok(self.tiers.get(MemoryTier::LongTerm).reindex().await?)
    }

    /// Evict expired short-term and working items now.
    pub async fn sweep_expired(&self) -> MaintenanceReport {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Evict items that are expired as of `now`.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        maintenance::sweep_expired(&self.tiers, &self.config, now).await
    }

    /// Start the periodic sweep loop. Returns false if it is already running.
    ///
    /// The loop also stops when the system is dropped.
    pub fn start_maintenance(&mut self) -> bool {
        if self.maintenance.is_some() {
            return false;
        }
        self.maintenance = Some(MaintenanceHandle::spawn(self.tiers.clone(), self.config.clone()));
        true
    }

    /// Stop the periodic sweep loop and wait for it to exit.
    pub async fn stop_maintenance(&mut self) {
        if let Some(handle) = self.maintenance.take() {
            handle.stop().await;
        }
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance.is_some()
    }

    /// Item counts per tier.
    pub async fn stats(&self) -> SdkResult<MemoryStats> {
        let long_term = self.tiers.get(MemoryTier::LongTerm);
        let indexed = match long_term.index() {
            Some(index) => index.len().await,
            None => 0,
        };

        Ok(MemoryStats {
            short_term: self.tiers.get(MemoryTier::ShortTerm).len().await?,
            working: self.tiers.get(MemoryTier::Working).len().await?,
            long_term: long_term.len().await?,
            indexed,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Migration
    // ─────────────────────────────────────────────────────────────────────

    pub fn migrations(&self) -> &VersionGraph {
        &self.migrations
    }

    /// Registered migration hops, for adding new ones.
    pub fn migrations_mut(&mut self) -> &mut VersionGraph {
        &mut self.migrations
    }

    /// Migrate stored items using the registered hops.
    pub async fn migrate(&self, from: &str, to: &str) -> SdkResult<MigrationReport> {
        migration::run(&self.tiers, &self.migrations, from, to).await
    }

    /// Migrate stored items using a caller-supplied planner.
    pub async fn migrate_with<P>(&self, planner: &P, from: &str, to: &str) -> SdkResult<MigrationReport>
    where
        P: MigrationPlanner + ?Sized,
    {
        migration::run(&self.tiers, planner, from, to).await
    }

    /// Migrate and report success.
    ///
    /// Per-item failures do not make the migration fail; an unresolvable
    /// version pair or an I/O error does.
    pub async fn migrate_version(&self, old_version: &str, new_version: &str) -> bool {
        match self.migrate(old_version, new_version).await {
            Ok(_) => true,
            Err(e) => {
                error!(from = %old_version, to = %new_version, error = %e, "Migration failed");
                false
            }
        }
    }
}
