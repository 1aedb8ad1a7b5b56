//! Tiered Memory System
//!
//! Implements a three-tier memory store:
//! - Short-term: Recent observations (evicted after 1 hour by default)
//! - Working: Session-scoped context (evicted after 24 hours by default)
//! - Long-term: Durable knowledge, indexed by keyword
//!
//! # Maintenance
//!
//! Beyond TTL eviction, `optimize()` collapses duplicate short-term items,
//! folds each working session into a single record and rebuilds the
//! long-term index.

mod coordinator;
mod maintenance;
mod system;
mod tiers;

pub use coordinator::{ResultSink, SCAN_SLOTS, TierSelection};
pub use maintenance::{MERGED_PREFIX, MaintenanceReport, OptimizeReport};
pub use system::{MemoryStats, MemorySystem};

pub(crate) use tiers::TierSet;
