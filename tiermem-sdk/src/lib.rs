//! tiermem SDK - Tiered Memory Store
//!
//! This crate provides the `MemorySystem` facade over the tier stores in
//! `tiermem-core`:
//!
//! # Core Modules (from tiermem-core)
//!
//! - **value** - Payload tree shared by storage, scoring and migration
//! - **compression** - Envelope codec for large or binary payloads
//! - **search** - Text, pattern and structured queries
//! - **store** - File-backed tier stores
//!
//! # SDK Modules
//!
//! - **memory** - Tier coordination: fan-out search, maintenance, stats
//! - **migration** - Versioned schema migration of stored items
//!
//! # Example
//!
//! ```rust,no_run
//! use tiermem_sdk::{MemoryConfig, MemorySystem, MemoryTier, Query, StoreOptions, TierSelection, Value};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let memory = MemorySystem::open(MemoryConfig::new("/var/lib/tiermem")).await?;
//!
//!     // Remember something for the current session
//!     memory
//!         .store(
//!             MemoryTier::Working,
//!             "checkout-notes",
//!             Value::from(serde_json::json!({"theme": "slow checkout"})),
//!             &StoreOptions::session("interview-7"),
//!         )
//!         .await?;
//!
//!     // Find it again across every tier
//!     let hits = memory
//!         .parallel_search(&Query::text("slow checkout"), TierSelection::All, Some(5), None)
//!         .await?;
//!     println!("{} hits", hits.len());
//!
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core modules from tiermem-core
// ─────────────────────────────────────────────────────────────────────────────

/// Payload value model
pub use tiermem_core::value;

/// Envelope codec
pub use tiermem_core::compression;

/// Match scoring
pub use tiermem_core::search;

/// Tier stores
pub use tiermem_core::store;

/// Core types (MemoryItem, SearchResult, etc.)
pub use tiermem_core::types;

/// Error types from core
pub use tiermem_core::error as core_error;

// ─────────────────────────────────────────────────────────────────────────────
// SDK-specific modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod memory;
pub mod migration;
pub mod utils;

mod config;
mod error;

// Re-export main SDK types
pub use config::{ConfigValidationError, MemoryConfig, SearchConfig};
pub use error::{SdkError, SdkResult};

pub use memory::{
    MaintenanceReport, MemoryStats, MemorySystem, OptimizeReport, ResultSink, TierSelection,
};
pub use migration::{
    MigrationHop, MigrationPlanner, MigrationReport, MigrationStep, Selector, Transform, ValidationRule,
    VersionGraph,
};

pub use tiermem_core::{
    CompressionConfig, Criterion, Envelope, MemoryItem, MemoryTier, Query, SearchResult, StoreOptions,
    TierMetadata, Value,
};
