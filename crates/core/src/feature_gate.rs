//! Rollout gating keyed by root namespace.

use std::collections::{HashMap, HashSet};

use crate::status::ProjectContext;
use crate::types::DbId;

/// Decides whether analyzer status updates run for a root namespace.
pub trait FeatureGate: Send + Sync {
    fn enabled(&self, root_namespace_id: DbId) -> bool;
}

/// Gate backed by a fixed set of root namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootAllowList {
    /// Every root namespace is enabled.
    All,
    /// Only the listed root namespaces are enabled.
    Only(HashSet<DbId>),
}

impl RootAllowList {
    /// Parse `*` (all roots), an empty string (no roots), or a
    /// comma-separated list of root namespace IDs.
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if value == "*" {
            return Ok(Self::All);
        }
        let ids = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<DbId>()
                    .map_err(|_| format!("Invalid root namespace id '{s}'"))
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self::Only(ids))
    }
}

impl FeatureGate for RootAllowList {
    fn enabled(&self, root_namespace_id: DbId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&root_namespace_id),
        }
    }
}

/// Keep the projects whose root namespace is enabled, asking the gate once
/// per distinct root.
pub fn filter_enabled_projects(
    gate: &dyn FeatureGate,
    projects: Vec<ProjectContext>,
) -> Vec<ProjectContext> {
    let mut decisions: HashMap<DbId, bool> = HashMap::new();
    projects
        .into_iter()
        .filter(|project| {
            *decisions
                .entry(project.root_namespace_id())
                .or_insert_with_key(|root| gate.enabled(*root))
        })
        .collect()
}
