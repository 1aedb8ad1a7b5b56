//! Schema Migrations
//!
//! Rewrites stored items between schema versions. A planner resolves the
//! hops between two versions; each hop is a list of steps, and each step
//! selects items, transforms a copy of their payload and writes it back
//! only if it validates.
//!
//! Failures are per item: the item keeps its old contents, the failure is
//! logged and counted, and the step moves on. Nothing is rolled back.
//!
//! Long-term items carry a schema version. A hop only touches the long-term
//! items that were at its source version when the hop started, and stamps
//! the ones it rewrites with its target version, so re-running a migration
//! leaves already migrated items alone. Short-term and working items carry
//! no version: every run whose selector matches them transforms them again.

mod planner;
mod transforms;

pub use planner::{MigrationHop, MigrationPlanner, VersionGraph};
pub use transforms::{
    FieldModifier, ItemPredicate, MigrationStep, PayloadCheck, Selector, Transform, ValidationRule,
};

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use tiermem_core::{LongTermMetadata, MemoryItem, MemoryTier, TierMetadata, Value};

use crate::error::SdkResult;
use crate::memory::TierSet;

/// Outcome of one migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Steps executed
    pub steps: usize,
    /// Items rewritten
    pub migrated: usize,
    /// Items whose transformed payload failed validation
    pub skipped_invalid: usize,
    /// Items whose transforms or write failed
    pub failed: usize,
}

/// Resolve the plan, then apply every hop in order.
///
/// An unresolvable version pair fails before any item is read.
pub(crate) async fn run<P>(tiers: &TierSet, planner: &P, from: &str, to: &str) -> SdkResult<MigrationReport>
where
    P: MigrationPlanner + ?Sized,
{
    let plan = planner.plan(from, to)?;
    let mut report = MigrationReport::default();

    for hop in plan {
        let pending = versioned_keys(tiers, &hop.from).await?;
        info!(
            from = %hop.from,
            to = %hop.to,
            steps = hop.steps.len(),
            long_term_items = pending.len(),
            "Applying migration hop"
        );
        for step in &hop.steps {
            run_step(tiers, step, hop, &pending, &mut report).await?;
            report.steps += 1;
        }
    }

    info!(
        from = %from,
        to = %to,
        steps = report.steps,
        migrated = report.migrated,
        skipped_invalid = report.skipped_invalid,
        failed = report.failed,
        "Migration complete"
    );
    Ok(report)
}

/// Keys of the long-term items at `version`.
async fn versioned_keys(tiers: &TierSet, version: &str) -> SdkResult<HashSet<String>> {
    Ok(tiers
        .get(MemoryTier::LongTerm)
        .load_all()
        .await?
        .into_iter()
        .filter(|item| matches!(&item.metadata, TierMetadata::LongTerm(meta) if meta.version == version))
        .map(|item| item.key)
        .collect())
}

async fn run_step(
    tiers: &TierSet,
    step: &MigrationStep,
    hop: &MigrationHop,
    pending: &HashSet<String>,
    report: &mut MigrationReport,
) -> SdkResult<()> {
    info!(step = %step.name, "Executing migration step");

    for store in tiers.iter() {
        for item in store.load_all().await? {
            if item.tier() == MemoryTier::LongTerm && !pending.contains(&item.key) {
                continue;
            }
            if !step.selector.matches(&item) {
                continue;
            }

            let payload = match step.apply(&item.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(step = %step.name, tier = %item.tier(), key = %item.key, error = %e, "Failed to migrate item");
                    report.failed += 1;
                    continue;
                }
            };

            if !step.validation.is_valid(&payload) {
                warn!(step = %step.name, tier = %item.tier(), key = %item.key, "Validation failed for migrated item");
                report.skipped_invalid += 1;
                continue;
            }

            let key = item.key.clone();
            match store.rewrite(migrated_item(item, payload, &hop.to)).await {
                Ok(()) => report.migrated += 1,
                Err(e) => {
                    warn!(step = %step.name, tier = %store.tier(), key = %key, error = %e, "Failed to write migrated item");
                    report.failed += 1;
                }
            }
        }
    }
    Ok(())
}

/// Long-term items are stamped with the version the hop migrates to.
fn migrated_item(item: MemoryItem, payload: Value, version: &str) -> MemoryItem {
    let MemoryItem {
        key,
        timestamp,
        metadata,
        ..
    } = item;

    let metadata = match metadata {
        TierMetadata::LongTerm(metadata) => TierMetadata::LongTerm(LongTermMetadata {
            item_type: metadata.item_type,
            version: version.to_string(),
        }),
        other => other,
    };
    MemoryItem {
        key,
        payload,
        timestamp,
        metadata,
    }
}
