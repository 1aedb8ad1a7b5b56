//! tiermem-core - Core library for tiermem
//!
//! This crate provides the storage primitives the SDK builds on:
//!
//! - **value**: Closed payload tree with a shared string-leaf visitor
//! - **compression**: Envelope codec (JSON/bincode, zlib, base64)
//! - **store**: File-backed tier stores with read-through cache
//! - **index**: Long-term key -> location/keywords index
//! - **search**: Text, pattern and structured match scoring
//! - **validation**: Key and schema version checks

pub mod compression;
pub mod error;
pub mod index;
pub mod search;
pub mod store;
pub mod types;
pub mod validation;
pub mod value;

// Re-export commonly used types
pub use compression::{CompressionConfig, Compressor, Encoding, Envelope};
pub use error::{Error, Result};
pub use index::{LongTermIndex, extract_keywords};
pub use search::{Criterion, Query, Regex, Scorer};
pub use store::TierStore;
pub use types::{IndexEntry, LongTermMetadata, MemoryItem, MemoryTier, SearchResult, StoreOptions, TierMetadata};
pub use value::{Leaf, Value};
