//! The three tier stores of one memory system.

use std::path::Path;
use std::sync::Arc;

use tiermem_core::{MemoryTier, Result, TierStore};

/// Shared handles to the short-term, working and long-term stores.
#[derive(Clone)]
pub(crate) struct TierSet {
    short_term: Arc<TierStore>,
    working: Arc<TierStore>,
    long_term: Arc<TierStore>,
}

impl TierSet {
    /// Open `<base>/short_term`, `<base>/working` and `<base>/long_term`.
    pub async fn open(base: &Path, schema_version: &str) -> Result<Self> {
        let open = |tier: MemoryTier| TierStore::open(tier, base.join(tier.as_str()), schema_version);
        Ok(Self {
            short_term: Arc::new(open(MemoryTier::ShortTerm).await?),
            working: Arc::new(open(MemoryTier::Working).await?),
            long_term: Arc::new(open(MemoryTier::LongTerm).await?),
        })
    }

    pub fn get(&self, tier: MemoryTier) -> &Arc<TierStore> {
        match tier {
            MemoryTier::ShortTerm => &self.short_term,
            MemoryTier::Working => &self.working,
            MemoryTier::LongTerm => &self.long_term,
        }
    }

    /// All stores in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TierStore>> {
        MemoryTier::ALL.into_iter().map(|tier| self.get(tier))
    }
}
