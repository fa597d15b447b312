//! [`HierarchySource`] and [`AnalyzerStatusStore`] backed by PostgreSQL.
//!
//! Every mutating operation runs in one transaction. Writers that touch a
//! project's rows first take a transaction-scoped advisory lock on the
//! project, then diff against the rows they read under that lock, so two
//! workers processing the same project can never both count the same
//! transition. Counter rows are only changed by additive upserts.
//!
//! Locks are taken in one global order, and each class in ascending key
//! order:
//!
//! 1. project advisory locks, by project ID;
//! 2. project status rows, by `(project_id, analyzer_type)`;
//! 3. namespace advisory locks, by namespace ID, covering every namespace
//!    whose counter rows the transaction writes or deletes;
//! 4. counter rows.
//!
//! No transaction waits on a lock of an earlier class, or on a lower key of
//! the same class, while holding a later one, so concurrent writers queue
//! instead of deadlocking.

use std::collections::HashMap;

use async_trait::async_trait;
use secinv_core::analyzer::SecuritySettingField;
use secinv_core::diff::{
    ancestor_updates, contribution_diff, plan_commit, relocation_diffs, NamespaceDiff,
};
use secinv_core::error::{CoreError, CoreResult};
use secinv_core::status::{
    CountedLocation, NamespaceAnalyzerStatus, ProjectAnalyzerStatus, ProjectContext,
    ProjectStatusUpdate,
};
use secinv_core::store::{AnalyzerStatusStore, HierarchySource, RewriteBatch};
use secinv_core::types::{DbId, TraversalIds};
use sqlx::{PgConnection, PgPool};

use crate::models::analyzer_status::{AnalyzerNamespaceStatusRow, AnalyzerProjectStatusRow};
use crate::repositories::{
    AnalyzerNamespaceStatusRepo, AnalyzerProjectStatusRepo, NamespaceRepo, ProjectRepo,
    SecuritySettingRepo,
};

/// PostgreSQL-backed analyzer status store.
#[derive(Debug, Clone)]
pub struct PgAnalyzerStatusStore {
    pool: PgPool,
}

impl PgAnalyzerStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn project_rows(rows: Vec<AnalyzerProjectStatusRow>) -> CoreResult<Vec<ProjectAnalyzerStatus>> {
    rows.into_iter().map(ProjectAnalyzerStatus::try_from).collect()
}

/// Domain rows plus the location each project is counted under.
fn counted_rows(
    rows: Vec<AnalyzerProjectStatusRow>,
) -> CoreResult<(Vec<ProjectAnalyzerStatus>, HashMap<DbId, CountedLocation>)> {
    let mut counted = HashMap::new();
    for row in &rows {
        counted.entry(row.project_id).or_insert_with(|| row.location());
    }
    Ok((project_rows(rows)?, counted))
}

fn namespace_rows(
    rows: Vec<AnalyzerNamespaceStatusRow>,
) -> CoreResult<Vec<NamespaceAnalyzerStatus>> {
    rows.into_iter().map(NamespaceAnalyzerStatus::try_from).collect()
}

/// Lock every namespace the diffs reach, plus `also_lock`, in ascending
/// order, then apply the diffs to every ancestor counter inside `conn`'s
/// transaction.
async fn lock_and_apply(
    conn: &mut PgConnection,
    diffs: &[NamespaceDiff],
    also_lock: &[DbId],
) -> CoreResult<()> {
    let deltas = ancestor_updates(diffs);
    let mut namespace_ids: Vec<DbId> = deltas
        .iter()
        .map(|delta| delta.namespace_id)
        .chain(also_lock.iter().copied())
        .collect();
    namespace_ids.sort_unstable();
    namespace_ids.dedup();

    AnalyzerNamespaceStatusRepo::lock_namespaces(&mut *conn, &namespace_ids)
        .await
        .map_err(CoreError::storage)?;
    for delta in &deltas {
        AnalyzerNamespaceStatusRepo::add_counts(&mut *conn, delta)
            .await
            .map_err(CoreError::storage)?;
    }
    Ok(())
}

#[async_trait]
impl HierarchySource for PgAnalyzerStatusStore {
    async fn project_contexts(&self, project_ids: &[DbId]) -> CoreResult<Vec<ProjectContext>> {
        let rows = ProjectRepo::find_contexts(&self.pool, project_ids)
            .await
            .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(ProjectContext::from).collect())
    }

    async fn namespace_traversal_ids(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Option<TraversalIds>> {
        NamespaceRepo::find_traversal_ids(&self.pool, namespace_id)
            .await
            .map_err(CoreError::storage)
    }

    async fn security_settings(
        &self,
        project_ids: &[DbId],
        field: SecuritySettingField,
    ) -> CoreResult<HashMap<DbId, bool>> {
        let rows = SecuritySettingRepo::list_field(&self.pool, project_ids, field)
            .await
            .map_err(CoreError::storage)?;
        Ok(rows.into_iter().collect())
    }

    async fn list_project_ids(&self, after_id: DbId, limit: usize) -> CoreResult<Vec<DbId>> {
        let limit = i64::try_from(limit).map_err(|e| CoreError::Validation(e.to_string()))?;
        ProjectRepo::list_ids_after(&self.pool, after_id, limit)
            .await
            .map_err(CoreError::storage)
    }
}

#[async_trait]
impl AnalyzerStatusStore for PgAnalyzerStatusStore {
    async fn project_statuses(
        &self,
        project_ids: &[DbId],
    ) -> CoreResult<Vec<ProjectAnalyzerStatus>> {
        let rows = AnalyzerProjectStatusRepo::list_by_projects(&self.pool, project_ids)
            .await
            .map_err(CoreError::storage)?;
        project_rows(rows)
    }

    async fn counted_location(&self, project_id: DbId) -> CoreResult<Option<CountedLocation>> {
        let location = AnalyzerProjectStatusRepo::find_location(&self.pool, project_id)
            .await
            .map_err(CoreError::storage)?;
        Ok(location.map(|(namespace_id, traversal_ids)| CountedLocation {
            namespace_id,
            traversal_ids,
        }))
    }

    async fn commit_statuses(
        &self,
        updates: &[ProjectStatusUpdate],
    ) -> CoreResult<Vec<NamespaceDiff>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let mut project_ids: Vec<DbId> = updates.iter().map(|u| u.project.project_id).collect();
        project_ids.sort_unstable();
        project_ids.dedup();

        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        AnalyzerProjectStatusRepo::lock_projects(&mut tx, &project_ids)
            .await
            .map_err(CoreError::storage)?;

        let stored = AnalyzerProjectStatusRepo::list_by_projects_for_update(&mut tx, &project_ids)
            .await
            .map_err(CoreError::storage)?;
        let (stored, counted) = counted_rows(stored)?;
        let plan = plan_commit(updates, &stored, &counted);

        AnalyzerProjectStatusRepo::upsert_all(&mut tx, &plan.rows)
            .await
            .map_err(CoreError::storage)?;
        AnalyzerProjectStatusRepo::set_locations(&mut tx, &plan.relocated)
            .await
            .map_err(CoreError::storage)?;
        lock_and_apply(&mut tx, &plan.diffs, &[]).await?;

        tx.commit().await.map_err(CoreError::storage)?;
        tracing::debug!(
            projects = project_ids.len(),
            rows = plan.rows.len(),
            relocated = plan.relocated.len(),
            namespaces = plan.diffs.len(),
            "Committed analyzer statuses",
        );
        Ok(plan.diffs)
    }

    async fn apply_namespace_diffs(&self, diffs: &[NamespaceDiff]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        lock_and_apply(&mut tx, diffs, &[]).await?;
        tx.commit().await.map_err(CoreError::storage)
    }

    async fn set_archived(&self, project_id: DbId, archived: bool) -> CoreResult<u64> {
        AnalyzerProjectStatusRepo::set_archived(&self.pool, project_id, archived)
            .await
            .map_err(CoreError::storage)
    }

    async fn delete_project_statuses(
        &self,
        project_id: DbId,
    ) -> CoreResult<Option<NamespaceDiff>> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        AnalyzerProjectStatusRepo::lock_projects(&mut tx, &[project_id])
            .await
            .map_err(CoreError::storage)?;

        let rows = AnalyzerProjectStatusRepo::list_by_projects_for_update(&mut tx, &[project_id])
            .await
            .map_err(CoreError::storage)?;
        let (rows, counted) = counted_rows(rows)?;
        let contribution = contribution_diff(&rows);
        let retraction = counted
            .get(&project_id)
            .filter(|_| !contribution.is_empty())
            .map(|location| NamespaceDiff::at(location, contribution.negated()));
        if let Some(retraction) = &retraction {
            lock_and_apply(&mut tx, std::slice::from_ref(retraction), &[]).await?;
        }

        AnalyzerProjectStatusRepo::delete_by_project(&mut tx, project_id)
            .await
            .map_err(CoreError::storage)?;
        tx.commit().await.map_err(CoreError::storage)?;
        Ok(retraction)
    }

    async fn transfer_project_statuses(
        &self,
        to: &ProjectContext,
    ) -> CoreResult<Vec<NamespaceDiff>> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        AnalyzerProjectStatusRepo::lock_projects(&mut tx, &[to.project_id])
            .await
            .map_err(CoreError::storage)?;

        let rows = AnalyzerProjectStatusRepo::list_by_projects_for_update(&mut tx, &[to.project_id])
            .await
            .map_err(CoreError::storage)?;
        let (rows, counted) = counted_rows(rows)?;
        let destination = to.location();
        let Some(from) = counted.get(&to.project_id).filter(|from| **from != destination) else {
            return Ok(Vec::new());
        };

        let diffs = relocation_diffs(&contribution_diff(&rows), from, &destination);
        lock_and_apply(&mut tx, &diffs, &[]).await?;
        AnalyzerProjectStatusRepo::set_locations(&mut tx, &[(to.project_id, destination)])
            .await
            .map_err(CoreError::storage)?;
        tx.commit().await.map_err(CoreError::storage)?;
        Ok(diffs)
    }

    async fn namespace_statuses(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Vec<NamespaceAnalyzerStatus>> {
        let rows = AnalyzerNamespaceStatusRepo::list_by_namespace(&self.pool, namespace_id)
            .await
            .map_err(CoreError::storage)?;
        namespace_rows(rows)
    }

    async fn stored_namespace_traversal_ids(
        &self,
        namespace_id: DbId,
    ) -> CoreResult<Option<TraversalIds>> {
        AnalyzerNamespaceStatusRepo::find_traversal_ids(&self.pool, namespace_id)
            .await
            .map_err(CoreError::storage)
    }

    async fn transfer_subtree_statuses(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> CoreResult<Vec<NamespaceDiff>> {
        if old_prefix.is_empty() || old_prefix == new_prefix {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        let rows = AnalyzerProjectStatusRepo::list_counted_under_for_update(&mut tx, old_prefix)
            .await
            .map_err(CoreError::storage)?;
        let row_ids: Vec<DbId> = rows.iter().map(|row| row.id).collect();
        let contribution = contribution_diff(&project_rows(rows)?);

        let diffs: Vec<NamespaceDiff> = [
            NamespaceDiff::for_strict_ancestors(old_prefix, contribution.negated()),
            NamespaceDiff::for_strict_ancestors(new_prefix, contribution),
        ]
        .into_iter()
        .flatten()
        .collect();
        lock_and_apply(&mut tx, &diffs, &[]).await?;

        AnalyzerProjectStatusRepo::rewrite_prefix(&mut tx, &row_ids, old_prefix, new_prefix)
            .await
            .map_err(CoreError::storage)?;
        tx.commit().await.map_err(CoreError::storage)?;
        Ok(diffs)
    }

    async fn rewrite_traversal_prefix_batch(
        &self,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
        after_namespace_id: DbId,
        batch_size: usize,
    ) -> CoreResult<RewriteBatch> {
        let limit = i64::try_from(batch_size).map_err(|e| CoreError::Validation(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        let namespace_ids =
            AnalyzerNamespaceStatusRepo::prefix_batch(&mut *tx, old_prefix, after_namespace_id, limit)
                .await
                .map_err(CoreError::storage)?;
        let Some(&last_namespace_id) = namespace_ids.last() else {
            return Ok(RewriteBatch::default());
        };

        AnalyzerNamespaceStatusRepo::lock_namespaces(&mut tx, &namespace_ids)
            .await
            .map_err(CoreError::storage)?;
        let rows =
            AnalyzerNamespaceStatusRepo::rewrite_prefix(&mut tx, &namespace_ids, old_prefix, new_prefix)
                .await
                .map_err(CoreError::storage)?;
        tx.commit().await.map_err(CoreError::storage)?;

        Ok(RewriteBatch {
            rows,
            last_namespace_id: Some(last_namespace_id),
        })
    }

    async fn delete_namespace_subtree(
        &self,
        namespace_id: DbId,
        traversal_ids: &[DbId],
    ) -> CoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;
        let rows = AnalyzerProjectStatusRepo::list_counted_under_for_update(&mut tx, traversal_ids)
            .await
            .map_err(CoreError::storage)?;
        let row_ids: Vec<DbId> = rows.iter().map(|row| row.id).collect();
        let contribution = contribution_diff(&project_rows(rows)?);

        let subtree =
            AnalyzerNamespaceStatusRepo::subtree_namespace_ids(&mut *tx, namespace_id, traversal_ids)
                .await
                .map_err(CoreError::storage)?;
        let retraction: Vec<NamespaceDiff> =
            NamespaceDiff::for_strict_ancestors(traversal_ids, contribution.negated())
                .into_iter()
                .collect();
        lock_and_apply(&mut tx, &retraction, &subtree).await?;

        AnalyzerProjectStatusRepo::delete_by_ids(&mut tx, &row_ids)
            .await
            .map_err(CoreError::storage)?;
        let deleted = AnalyzerNamespaceStatusRepo::delete_namespaces(&mut tx, &subtree)
            .await
            .map_err(CoreError::storage)?;
        tx.commit().await.map_err(CoreError::storage)?;
        Ok(deleted)
    }
}
