//! Analyzer status records as seen by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalyzerStatus, AnalyzerType};
use crate::traversal;
use crate::types::{DbId, Timestamp, TraversalIds};

/// Where a project sits in the namespace hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: DbId,
    pub namespace_id: DbId,
    /// Path of the project's namespace, root first.
    pub traversal_ids: TraversalIds,
    pub archived: bool,
}

impl ProjectContext {
    pub fn root_namespace_id(&self) -> DbId {
        traversal::root_of(&self.traversal_ids).unwrap_or(self.namespace_id)
    }

    /// The project's current position as a [`CountedLocation`].
    pub fn location(&self) -> CountedLocation {
        CountedLocation {
            namespace_id: self.namespace_id,
            traversal_ids: self.traversal_ids.clone(),
        }
    }
}

/// The position a project's status rows were last counted under.
///
/// Lags the hierarchy between a move and the handling of its transfer event.
/// Counter rows always hold the sum of every project's rows at its counted
/// location, so moving a contribution starts from here and never from an
/// event's claim about the old position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountedLocation {
    pub namespace_id: DbId,
    pub traversal_ids: TraversalIds,
}

/// Current status of one analyzer type for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAnalyzerStatus {
    pub project_id: DbId,
    pub analyzer_type: AnalyzerType,
    pub status: AnalyzerStatus,
    pub archived: bool,
    /// Build that produced the status (pipeline-based types only).
    pub build_id: Option<DbId>,
    /// When that build ran: `started_at`, falling back to `created_at`.
    pub last_call: Option<Timestamp>,
}

impl ProjectAnalyzerStatus {
    /// A status with no build attached.
    pub fn without_build(
        project: &ProjectContext,
        analyzer_type: AnalyzerType,
        status: AnalyzerStatus,
    ) -> Self {
        Self {
            project_id: project.project_id,
            analyzer_type,
            status,
            archived: project.archived,
            build_id: None,
            last_call: None,
        }
    }
}

/// A status row together with the location it is counted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedStatus {
    pub status: ProjectAnalyzerStatus,
    pub location: CountedLocation,
}

/// Rolling `success` / `failed` counters of one analyzer type across a
/// namespace's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceAnalyzerStatus {
    pub namespace_id: DbId,
    pub analyzer_type: AnalyzerType,
    pub success: i64,
    pub failure: i64,
    pub traversal_ids: TraversalIds,
}

/// New status rows computed for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStatusUpdate {
    pub project: ProjectContext,
    pub statuses: Vec<ProjectAnalyzerStatus>,
}

/// Analyzer type to status lookup for a single project.
pub type StatusMap = BTreeMap<AnalyzerType, AnalyzerStatus>;

/// Build a [`StatusMap`] from the rows of a single project.
pub fn status_map<'a, I>(rows: I) -> StatusMap
where
    I: IntoIterator<Item = &'a ProjectAnalyzerStatus>,
{
    rows.into_iter()
        .map(|row| (row.analyzer_type, row.status))
        .collect()
}
