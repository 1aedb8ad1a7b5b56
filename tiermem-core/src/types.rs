//! Memory Type Definitions
//!
//! Defines the core types for the tiered memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Memory tier (short-term, working, long-term)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    Working,
    LongTerm,
}

impl MemoryTier {
    /// All tiers, in scan order
    pub const ALL: [MemoryTier; 3] = [MemoryTier::ShortTerm, MemoryTier::Working, MemoryTier::LongTerm];

    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "short_term" => Some(Self::ShortTerm),
            "working" => Some(Self::Working),
            "long_term" => Some(Self::LongTerm),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::Working => "working",
            Self::LongTerm => "long_term",
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Long-term item metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermMetadata {
    #[serde(rename = "type")]
    pub item_type: String,
    pub version: String,
}

/// Tier-specific metadata carried by an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierMetadata {
    ShortTerm,
    Working {
        session_id: String,
        /// Number of records folded into this one by a session merge
        merged_from: Option<usize>,
    },
    LongTerm(LongTermMetadata),
}

impl TierMetadata {
    pub fn tier(&self) -> MemoryTier {
        match self {
            Self::ShortTerm => MemoryTier::ShortTerm,
            Self::Working { .. } => MemoryTier::Working,
            Self::LongTerm(_) => MemoryTier::LongTerm,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Working { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// A stored item
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryItem {
    pub key: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub metadata: TierMetadata,
}

impl MemoryItem {
    pub fn tier(&self) -> MemoryTier {
        self.metadata.tier()
    }
}

/// Options for storing an item
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Session the item belongs to (required for working memory)
    pub session_id: Option<String>,
    /// Long-term `type` metadata (defaults to the payload kind)
    pub item_type: Option<String>,
}

impl StoreOptions {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }
}

/// A scored search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub key: String,
    pub payload: Value,
    pub tier: MemoryTier,
    pub timestamp: DateTime<Utc>,
    /// Match score in [0, 1]
    pub score: f64,
}

impl SearchResult {
    pub fn from_item(item: MemoryItem, score: f64) -> Self {
        Self {
            tier: item.tier(),
            key: item.key,
            payload: item.payload,
            timestamp: item.timestamp,
            score,
        }
    }
}

/// Long-term index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub item_type: String,
    pub keywords: Vec<String>,
}
