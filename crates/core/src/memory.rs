//! In-memory implementation of [`HierarchySource`] and [`AnalyzerStatusStore`].
//!
//! Every operation runs under one mutex, which gives it the same
//! all-or-nothing behaviour as a database transaction. Used by the service
//! test suites and for running the engine without PostgreSQL.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::analyzer::{AnalyzerStatus, AnalyzerType, SecuritySettingField};
use crate::diff::{
    ancestor_updates, contribution_diff, plan_commit, relocation_diffs, Diff, NamespaceDiff,
};
use crate::error::{CoreError, CoreResult};
use crate::status::{
    CountedLocation, NamespaceAnalyzerStatus, ProjectAnalyzerStatus, ProjectContext,
    ProjectStatusUpdate,
};
use crate::store::{AnalyzerStatusStore, HierarchySource, RewriteBatch};
use crate::traversal;
use crate::types::{DbId, TraversalIds};

#[derive(Debug, Default)]
struct State {
    /// Namespace ID to its traversal IDs.
    namespaces: BTreeMap<DbId, TraversalIds>,
    /// Project ID to `(namespace_id, archived)`.
    projects: BTreeMap<DbId, (DbId, bool)>,
    settings: BTreeMap<DbId, HashMap<SecuritySettingField, bool>>,
    project_statuses: BTreeMap<(DbId, AnalyzerType), ProjectAnalyzerStatus>,
    /// Counted location of every project that has status rows.
    counted: BTreeMap<DbId, CountedLocation>,
    namespace_statuses: BTreeMap<(DbId, AnalyzerType), NamespaceAnalyzerStatus>,
    writes: u64,
    fail_writes: bool,
}

impl State {
    fn project_context(&self, project_id: DbId) -> Option<ProjectContext> {
        let (namespace_id, archived) = *self.projects.get(&project_id)?;
        let traversal_ids = self.namespaces.get(&namespace_id)?.clone();
        Some(ProjectContext {
            project_id,
            namespace_id,
            traversal_ids,
            archived,
        })
    }

    fn begin_write(&mut self) -> CoreResult<()> {
        if self.fail_writes {
            return Err(CoreError::storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated storage failure",
            )));
        }
        self.writes += 1;
        Ok(())
    }

    fn rows_of_project(&self, project_id: DbId) -> Vec<ProjectAnalyzerStatus> {
        self.project_statuses
            .iter()
            .filter(|((id, _), _)| *id == project_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    fn rows_of_namespace(&self, namespace_id: DbId) -> Vec<NamespaceAnalyzerStatus> {
        self.namespace_statuses
            .iter()
            .filter(|((id, _), _)| *id == namespace_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Projects counted under `prefix` and their summed contribution.
    fn counted_under(&self, prefix: &[DbId]) -> (Vec<DbId>, Diff) {
        if prefix.is_empty() {
            return (Vec::new(), Diff::new());
        }
        let project_ids: Vec<DbId> = self
            .counted
            .iter()
            .filter(|(_, location)| location.traversal_ids.starts_with(prefix))
            .map(|(id, _)| *id)
            .collect();
        let mut contribution = Diff::new();
        for project_id in &project_ids {
            contribution.merge(&contribution_diff(&self.rows_of_project(*project_id)));
        }
        (project_ids, contribution)
    }

    fn remove_project_rows(&mut self, project_id: DbId) {
        self.project_statuses.retain(|(id, _), _| *id != project_id);
        self.counted.remove(&project_id);
    }

    fn apply(&mut self, diffs: &[NamespaceDiff]) {
        for delta in ancestor_updates(diffs) {
            let row = self
                .namespace_statuses
                .entry((delta.namespace_id, delta.analyzer_type))
                .or_insert_with(|| NamespaceAnalyzerStatus {
                    namespace_id: delta.namespace_id,
                    analyzer_type: delta.analyzer_type,
                    success: 0,
                    failure: 0,
                    traversal_ids: delta.traversal_ids.clone(),
                });
            row.success += delta.success;
            row.failure += delta.failure;
        }
    }
}

/// Hierarchy and status storage held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- hierarchy fixtures ---------------------------------------------------

    /// Register a namespace under `parent_id` (or as a root). Returns its
    /// traversal IDs.
    pub async fn add_namespace(&self, namespace_id: DbId, parent_id: Option<DbId>) -> TraversalIds {
        let mut state = self.state.lock().await;
        let mut traversal_ids = parent_id
            .and_then(|parent| state.namespaces.get(&parent).cloned())
            .unwrap_or_default();
        traversal_ids.push(namespace_id);
        state.namespaces.insert(namespace_id, traversal_ids.clone());
        traversal_ids
    }

    pub async fn add_project(&self, project_id: DbId, namespace_id: DbId) -> ProjectContext {
        let mut state = self.state.lock().await;
        state.projects.insert(project_id, (namespace_id, false));
        ProjectContext {
            project_id,
            namespace_id,
            traversal_ids: state.namespaces.get(&namespace_id).cloned().unwrap_or_default(),
            archived: false,
        }
    }

    pub async fn set_security_setting(
        &self,
        project_id: DbId,
        field: SecuritySettingField,
        enabled: bool,
    ) {
        let mut state = self.state.lock().await;
        state
            .settings
            .entry(project_id)
            .or_default()
            .insert(field, enabled);
    }

    pub async fn set_project_archived(&self, project_id: DbId, archived: bool) {
        let mut state = self.state.lock().await;
        if let Some(project) = state.projects.get_mut(&project_id) {
            project.1 = archived;
        }
    }

    /// Move a project to another namespace (hierarchy only).
    pub async fn move_project(&self, project_id: DbId, namespace_id: DbId) {
        let mut state = self.state.lock().await;
        if let Some(project) = state.projects.get_mut(&project_id) {
            project.0 = namespace_id;
        }
    }

    /// Reparent a namespace and its subtree (hierarchy only; counter rows
    /// are left for the traversal ID maintenance to rewrite).
    pub async fn move_namespace(&self, namespace_id: DbId, new_parent_id: Option<DbId>) {
        let mut state = self.state.lock().await;
        let Some(old_path) = state.namespaces.get(&namespace_id).cloned() else {
            return;
        };
        let mut new_path = new_parent_id
            .and_then(|parent| state.namespaces.get(&parent).cloned())
            .unwrap_or_default();
        new_path.push(namespace_id);

        for path in state.namespaces.values_mut() {
            if let Some(rewritten) = traversal::rewrite_prefix(path, &old_path, &new_path) {
                *path = rewritten;
            }
        }
    }

    /// Remove a project from the hierarchy.
    pub async fn remove_project(&self, project_id: DbId) {
        let mut state = self.state.lock().await;
        state.projects.remove(&project_id);
        state.settings.remove(&project_id);
    }

    // -- inspection -----------------------------------------------------------

    /// `(success, failure)` of a namespace counter row, zero when absent.
    pub async fn counter(&self, namespace_id: DbId, analyzer_type: AnalyzerType) -> (i64, i64) {
        let state = self.state.lock().await;
        state
            .namespace_statuses
            .get(&(namespace_id, analyzer_type))
            .map(|row| (row.success, row.failure))
            .unwrap_or((0, 0))
    }

    /// `(success, failure)` recounted from the project rows of every project
    /// currently in the namespace's subtree.
    pub async fn recount(&self, namespace_id: DbId, analyzer_type: AnalyzerType) -> (i64, i64) {
        let state = self.state.lock().await;
        let mut totals = (0, 0);
        for project_id in state.projects.keys() {
            let Some(project) = state.project_context(*project_id) else {
                continue;
            };
            if !project.traversal_ids.contains(&namespace_id) {
                continue;
            }
            match state
                .project_statuses
                .get(&(*project_id, analyzer_type))
                .map(|row| row.status)
            {
                Some(AnalyzerStatus::Success) => totals.0 += 1,
                Some(AnalyzerStatus::Failed) => totals.1 += 1,
                _ => {}
            }
        }
        totals
    }

    pub async fn project_status(
        &self,
        project_id: DbId,
        analyzer_type: AnalyzerType,
    ) -> Option<ProjectAnalyzerStatus> {
        let state = self.state.lock().await;
        state
            .project_statuses
            .get(&(project_id, analyzer_type))
            .cloned()
    }

    /// Every counter row, ordered by `(namespace_id, analyzer_type)`.
    pub async fn all_namespace_statuses(&self) -> Vec<NamespaceAnalyzerStatus> {
        let state = self.state.lock().await;
        state.namespace_statuses.values().cloned().collect()
    }

    /// Number of successful write operations so far.
    pub async fn write_count(&self) -> u64 {
        self.state.lock().await.writes
    }

    /// Make every subsequent write fail with a storage error.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }
}

#[async_trait]
impl HierarchySource for MemoryStore {
    async fn project_contexts(&self, project_ids: &[DbId]) -> CoreResult<Vec<ProjectContext>> {
        let state = self.state.lock().await;
        Ok(project_ids
            .iter()
            .filter_map(|id| state.project_context(*id))
            .collect())
    }

    async fn namespace_traversal_ids(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Option<TraversalIds>> {
        let state = self.state.lock().await;
        Ok(state.namespaces.get(&namespace_id).cloned())
    }

    async fn security_settings(
        &self,
        project_ids: &[DbId],
        field: SecuritySettingField,
    ) -> CoreResult<HashMap<DbId, bool>> {
        let state = self.state.lock().await;
        Ok(project_ids
            .iter()
            .filter_map(|id| {
                state
                    .settings
                    .get(id)
                    .map(|fields| (*id, fields.get(&field).copied().unwrap_or(false)))
            })
            .collect())
    }

    async fn list_project_ids(&self, after_id: DbId, limit: usize) -> CoreResult<Vec<DbId>> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .range((after_id + 1)..)
            .take(limit)
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl AnalyzerStatusStore for MemoryStore {
    async fn project_statuses(
        &self,
        project_ids: &[DbId],
    ) -> CoreResult<Vec<ProjectAnalyzerStatus>> {
        let state = self.state.lock().await;
        Ok(project_ids
            .iter()
            .flat_map(|id| state.rows_of_project(*id))
            .collect())
    }

    async fn counted_location(&self, project_id: DbId) -> CoreResult<Option<CountedLocation>> {
        let state = self.state.lock().await;
        Ok(state.counted.get(&project_id).cloned())
    }

    async fn commit_statuses(
        &self,
        updates: &[ProjectStatusUpdate],
    ) -> CoreResult<Vec<NamespaceDiff>> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        let project_ids: BTreeSet<DbId> = updates.iter().map(|u| u.project.project_id).collect();
        let stored: Vec<ProjectAnalyzerStatus> = project_ids
            .iter()
            .flat_map(|id| state.rows_of_project(*id))
            .collect();
        let counted: HashMap<DbId, CountedLocation> = project_ids
            .iter()
            .filter_map(|id| state.counted.get(id).map(|location| (*id, location.clone())))
            .collect();
        let plan = plan_commit(updates, &stored, &counted);

        for row in plan.rows {
            let key = (row.status.project_id, row.status.analyzer_type);
            state.counted.insert(row.status.project_id, row.location);
            state.project_statuses.insert(key, row.status);
        }
        for (project_id, location) in plan.relocated {
            state.counted.insert(project_id, location);
        }
        state.apply(&plan.diffs);
        Ok(plan.diffs)
    }

    async fn apply_namespace_diffs(&self, diffs: &[NamespaceDiff]) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        state.begin_write()?;
        state.apply(diffs);
        Ok(())
    }

    async fn set_archived(&self, project_id: DbId, archived: bool) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        state.begin_write()?;
        let mut updated = 0;
        for ((id, _), row) in state.project_statuses.iter_mut() {
            if *id == project_id && row.archived != archived {
                row.archived = archived;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_project_statuses(
        &self,
        project_id: DbId,
    ) -> CoreResult<Option<NamespaceDiff>> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        let contribution = contribution_diff(&state.rows_of_project(project_id));
        let retraction = state
            .counted
            .get(&project_id)
            .filter(|_| !contribution.is_empty())
            .map(|location| NamespaceDiff::at(location, contribution.negated()));
        if let Some(retraction) = &retraction {
            state.apply(std::slice::from_ref(retraction));
        }
        state.remove_project_rows(project_id);
        Ok(retraction)
    }

    async fn transfer_project_statuses(
        &self,
        to: &ProjectContext,
    ) -> CoreResult<Vec<NamespaceDiff>> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        let Some(from) = state.counted.get(&to.project_id).cloned() else {
            return Ok(Vec::new());
        };
        let destination = to.location();
        let contribution = contribution_diff(&state.rows_of_project(to.project_id));
        let diffs = relocation_diffs(&contribution, &from, &destination);
        state.apply(&diffs);
        state.counted.insert(to.project_id, destination);
        Ok(diffs)
    }

    async fn namespace_statuses(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Vec<NamespaceAnalyzerStatus>> {
        let state = self.state.lock().await;
        Ok(state.rows_of_namespace(namespace_id))
    }

    async fn stored_namespace_traversal_ids(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Option<TraversalIds>> {
        let state = self.state.lock().await;
        Ok(state
            .rows_of_namespace(namespace_id)
            .into_iter()
            .next()
            .map(|row| row.traversal_ids))
    }

    async fn transfer_subtree_statuses(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> CoreResult<Vec<NamespaceDiff>> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        if old_prefix == new_prefix {
            return Ok(Vec::new());
        }
        let (project_ids, contribution) = state.counted_under(old_prefix);
        let diffs: Vec<NamespaceDiff> = [
            NamespaceDiff::for_strict_ancestors(old_prefix, contribution.negated()),
            NamespaceDiff::for_strict_ancestors(new_prefix, contribution),
        ]
        .into_iter()
        .flatten()
        .collect();
        state.apply(&diffs);

        for project_id in project_ids {
            if let Some(location) = state.counted.get_mut(&project_id) {
                if let Some(rewritten) =
                    traversal::rewrite_prefix(&location.traversal_ids, old_prefix, new_prefix)
                {
                    location.traversal_ids = rewritten;
                }
            }
        }
        Ok(diffs)
    }

    async fn rewrite_traversal_prefix_batch(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
        after_namespace_id: DbId,
        batch_size: usize,
    ) -> CoreResult<RewriteBatch> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        let batch: BTreeSet<DbId> = state
            .namespace_statuses
            .values()
            .filter(|row| {
                row.namespace_id > after_namespace_id && row.traversal_ids.starts_with(old_prefix)
            })
            .map(|row| row.namespace_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(batch_size)
            .collect();

        let mut rows = 0;
        for row in state.namespace_statuses.values_mut() {
            if !batch.contains(&row.namespace_id) {
                continue;
            }
            if let Some(rewritten) =
                traversal::rewrite_prefix(&row.traversal_ids, old_prefix, new_prefix)
            {
                row.traversal_ids = rewritten;
                rows += 1;
            }
        }

        Ok(RewriteBatch {
            rows,
            last_namespace_id: batch.last().copied(),
        })
    }

    async fn delete_namespace_subtree(
        &self,
        namespace_id: DbId,
        traversal_ids: &[DbId],
    ) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        state.begin_write()?;

        let (project_ids, contribution) = state.counted_under(traversal_ids);
        if let Some(retraction) =
            NamespaceDiff::for_strict_ancestors(traversal_ids, contribution.negated())
        {
            state.apply(std::slice::from_ref(&retraction));
        }
        for project_id in project_ids {
            state.remove_project_rows(project_id);
        }

        let before = state.namespace_statuses.len();
        state.namespace_statuses.retain(|(id, _), row| {
            *id != namespace_id
                && (traversal_ids.is_empty() || !row.traversal_ids.starts_with(traversal_ids))
        });
        Ok((before - state.namespace_statuses.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use AnalyzerStatus::{Failed, Success};
    use AnalyzerType::Sast;

    fn update(project: &ProjectContext, status: AnalyzerStatus) -> ProjectStatusUpdate {
        ProjectStatusUpdate {
            project: project.clone(),
            statuses: vec![ProjectAnalyzerStatus::without_build(project, Sast, status)],
        }
    }

    #[tokio::test]
    async fn commit_propagates_to_every_ancestor() {
        let store = MemoryStore::new();
        store.add_namespace(1, None).await;
        store.add_namespace(2, Some(1)).await;
        let project = store.add_project(10, 2).await;

        store.commit_statuses(&[update(&project, Success)]).await.unwrap();
        store.commit_statuses(&[update(&project, Failed)]).await.unwrap();

        assert_eq!(store.counter(1, Sast).await, (0, 1));
        assert_eq!(store.counter(2, Sast).await, (0, 1));
        assert_eq!(store.recount(1, Sast).await, (0, 1));
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.add_namespace(1, None).await;
        let project = store.add_project(10, 1).await;
        store.set_fail_writes(true).await;

        let result = store.commit_statuses(&[update(&project, Success)]).await;
        assert_matches!(result, Err(CoreError::Storage(_)));
        assert_eq!(store.counter(1, Sast).await, (0, 0));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn commit_after_move_counts_at_new_location() {
        let store = MemoryStore::new();
        store.add_namespace(1, None).await;
        store.add_namespace(2, Some(1)).await;
        store.add_namespace(5, None).await;
        let before = store.add_project(10, 2).await;
        store.commit_statuses(&[update(&before, Success)]).await.unwrap();

        store.move_project(10, 5).await;
        let after = store.project_context(10).await.unwrap().unwrap();
        store.commit_statuses(&[update(&after, Success)]).await.unwrap();

        assert_eq!(store.counter(1, Sast).await, (0, 0));
        assert_eq!(store.counter(2, Sast).await, (0, 0));
        assert_eq!(store.counter(5, Sast).await, (1, 0));
        assert_eq!(store.counted_location(10).await.unwrap(), Some(after.location()));
    }

    #[tokio::test]
    async fn move_namespace_rewrites_descendant_paths() {
        let store = MemoryStore::new();
        store.add_namespace(1, None).await;
        store.add_namespace(2, Some(1)).await;
        store.add_namespace(3, Some(2)).await;
        store.add_namespace(5, None).await;

        store.move_namespace(2, Some(5)).await;
        assert_eq!(store.namespace_traversal_ids(3).await.unwrap(), Some(vec![5, 2, 3]));
    }

    #[tokio::test]
    async fn settings_only_reported_for_projects_with_a_record() {
        let store = MemoryStore::new();
        store.add_namespace(1, None).await;
        store.add_project(10, 1).await;
        store.add_project(11, 1).await;
        store
            .set_security_setting(10, SecuritySettingField::SecretPushProtectionEnabled, true)
            .await;

        let settings = store
            .security_settings(&[10, 11], SecuritySettingField::SecretPushProtectionEnabled)
            .await
            .unwrap();
        assert_eq!(settings.get(&10), Some(&true));
        assert!(!settings.contains_key(&11));
    }
}
