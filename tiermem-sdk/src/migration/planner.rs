//! Migration path resolution.

use std::collections::{HashMap, VecDeque};

use tiermem_core::validation::validate_version;

use super::transforms::MigrationStep;
use crate::error::{SdkError, SdkResult};

/// Steps that take stored items from one schema version to the next
#[derive(Debug, Clone)]
pub struct MigrationHop {
    pub from: String,
    pub to: String,
    pub steps: Vec<MigrationStep>,
}

/// Resolves the ordered hops between two schema versions.
pub trait MigrationPlanner: Send + Sync {
    /// Hops to apply, in order. Equal versions resolve to an empty plan.
    fn plan(&self, from: &str, to: &str) -> SdkResult<Vec<&MigrationHop>>;
}

/// Registered hops, resolved by fewest hops (breadth-first).
///
/// Ties go to the hop registered first.
#[derive(Debug, Clone, Default)]
pub struct VersionGraph {
    hops: Vec<MigrationHop>,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the steps migrating `from` to `to`.
    pub fn register(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        steps: Vec<MigrationStep>,
    ) -> SdkResult<&mut Self> {
        let (from, to) = (from.into(), to.into());
        check_version(&from)?;
        check_version(&to)?;
        if from == to {
            return Err(SdkError::invalid_version(format!("hop from {} to itself", from)));
        }

        self.hops.push(MigrationHop { from, to, steps });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl MigrationPlanner for VersionGraph {
    fn plan(&self, from: &str, to: &str) -> SdkResult<Vec<&MigrationHop>> {
        check_version(from)?;
        check_version(to)?;
        if from == to {
            return Ok(Vec::new());
        }

        // version -> index of the hop that first reached it
        let mut reached_by: HashMap<&str, Option<usize>> = HashMap::from([(from, None)]);
        let mut queue = VecDeque::from([from]);

        while let Some(version) = queue.pop_front() {
            if version == to {
                break;
            }
            for (i, hop) in self.hops.iter().enumerate() {
                if hop.from == version && !reached_by.contains_key(hop.to.as_str()) {
                    reached_by.insert(&hop.to, Some(i));
                    queue.push_back(&hop.to);
                }
            }
        }

        if !reached_by.contains_key(to) {
            return Err(SdkError::no_migration_path(from, to));
        }

        let mut path = Vec::new();
        let mut version = to;
        while let Some(Some(i)) = reached_by.get(version) {
            let hop = &self.hops[*i];
            path.push(hop);
            version = &hop.from;
        }
        path.reverse();
        Ok(path)
    }
}

fn check_version(version: &str) -> SdkResult<()> {
    validate_version(version).map_err(|_| SdkError::invalid_version(version))
}
