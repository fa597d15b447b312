//! Storage seams of the analyzer status engine.
//!
//! [`HierarchySource`] reads the collaborators the engine does not own
//! (projects, namespaces, security settings). [`AnalyzerStatusStore`] owns the
//! project status rows and namespace counters.
//!
//! Implementations must apply counter changes as atomic "add to the existing
//! row or insert" operations. Read-modify-write of a counter is not allowed:
//! several workers update the same ancestor rows concurrently and addition
//! is the only operation that commutes.
//!
//! Every project's rows record the [`CountedLocation`] they are counted
//! under. Each counter row equals the sum of the counted rows of every
//! project whose counted path passes through it. Operations that move or
//! retract a contribution start from the counted location, never from the
//! hierarchy or an event payload, so they stay correct whatever order
//! hierarchy changes and status updates are handled in.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::analyzer::SecuritySettingField;
use crate::diff::NamespaceDiff;
use crate::error::CoreResult;
use crate::status::{
    CountedLocation, NamespaceAnalyzerStatus, ProjectAnalyzerStatus, ProjectContext,
    ProjectStatusUpdate,
};
use crate::types::{DbId, TraversalIds};

/// Result of one prefix-rewrite batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteBatch {
    /// Counter rows rewritten in this batch.
    pub rows: u64,
    /// Highest namespace ID processed; the cursor for the next batch.
    /// `None` when no rows matched.
    pub last_namespace_id: Option<DbId>,
}

#[async_trait]
pub trait HierarchySource: Send + Sync {
    /// Hierarchy context of each existing project in `project_ids`.
    async fn project_contexts(&self, project_ids: &[DbId]) -> CoreResult<Vec<ProjectContext>>;

    async fn project_context(&self, project_id: DbId) -> CoreResult<Option<ProjectContext>> {
        Ok(self.project_contexts(&[project_id]).await?.into_iter().next())
    }

    /// Current traversal IDs of a namespace.
    async fn namespace_traversal_ids(&self, namespace_id: DbId)
        -> CoreResult<Option<TraversalIds>>;

    /// The boolean `field` for each project that has a settings record.
    async fn security_settings(
        &self,
        project_ids: &[DbId],
        field: SecuritySettingField,
    ) -> CoreResult<HashMap<DbId, bool>>;

    /// Project IDs greater than `after_id`, ascending, at most `limit`.
    async fn list_project_ids(&self, after_id: DbId, limit: usize) -> CoreResult<Vec<DbId>>;
}

#[async_trait]
pub trait AnalyzerStatusStore: Send + Sync {
    /// Stored status rows of the given projects.
    async fn project_statuses(&self, project_ids: &[DbId])
        -> CoreResult<Vec<ProjectAnalyzerStatus>>;

    /// Location the project's rows are counted under; `None` without rows.
    async fn counted_location(&self, project_id: DbId) -> CoreResult<Option<CountedLocation>>;

    /// Upsert project status rows and propagate the resulting diffs.
    ///
    /// In a single transaction: serialize on the affected projects, re-read
    /// their rows and counted locations, then plan with
    /// [`plan_commit`](crate::diff::plan_commit). That moves the contribution
    /// of a project counted elsewhere to its current location, settles
    /// aggregated parents and diffs against the re-read rows. Upsert the rows
    /// keyed by `(project_id, analyzer_type)` with the current location and
    /// add the aggregated diffs to every ancestor counter. Returns the
    /// applied namespace diffs.
    async fn commit_statuses(&self, updates: &[ProjectStatusUpdate])
        -> CoreResult<Vec<NamespaceDiff>>;

    /// Add each diff to the counters of every namespace on its path, in one
    /// transaction.
    async fn apply_namespace_diffs(&self, diffs: &[NamespaceDiff]) -> CoreResult<()>;

    /// Set the archived flag on all rows of a project. Returns rows updated.
    async fn set_archived(&self, project_id: DbId, archived: bool) -> CoreResult<u64>;

    /// Retract the project's contribution from its counted location and
    /// delete its rows, in one transaction. Returns the retraction applied,
    /// if any.
    async fn delete_project_statuses(&self, project_id: DbId)
        -> CoreResult<Option<NamespaceDiff>>;

    /// Move the project's contribution from its counted location to `to`
    /// and record `to` on its rows, in one transaction. Returns the diffs
    /// applied; empty when the project is already counted at `to`.
    async fn transfer_project_statuses(&self, to: &ProjectContext)
        -> CoreResult<Vec<NamespaceDiff>>;

    /// Counter rows of a single namespace.
    async fn namespace_statuses(&self, namespace_id: DbId)
        -> CoreResult<Vec<NamespaceAnalyzerStatus>>;

    /// Traversal IDs recorded on any counter row of the namespace.
    async fn stored_namespace_traversal_ids(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Option<TraversalIds>>;

    /// Move the contribution of every project counted under `old_prefix`
    /// from the strict ancestors of `old_prefix` to those of `new_prefix`,
    /// and rewrite the counted paths of those projects, in one transaction.
    /// Returns the diffs applied.
    async fn transfer_subtree_statuses(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> CoreResult<Vec<NamespaceDiff>>;

    /// Rewrite the traversal IDs of up to `batch_size` namespaces (all of
    /// their counter rows) whose path starts with `old_prefix` and whose ID is
    /// greater than `after_namespace_id`. One atomic statement.
    async fn rewrite_traversal_prefix_batch(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
        after_namespace_id: DbId,
        batch_size: usize,
    ) -> CoreResult<RewriteBatch>;

    /// Retract the contribution of every project counted under
    /// `traversal_ids` from the namespace's strict ancestors, delete those
    /// projects' rows and every counter row in the subtree, in one
    /// transaction. Returns the number of counter rows deleted.
    async fn delete_namespace_subtree(
        &self,
        namespace_id: DbId,
        traversal_ids: &[DbId],
    ) -> CoreResult<u64>;
}
