use std::collections::HashMap;

use secinv_core::analyzer::AnalyzerType;
use secinv_core::computation::{compute_setting_statuses, ensure_batch_within_limit, setting_enabled};
use secinv_core::error::CoreResult;
use secinv_core::feature_gate::filter_enabled_projects;
use secinv_core::status::{ProjectAnalyzerStatus, ProjectStatusUpdate};
use secinv_core::types::DbId;

use crate::context::StatusContext;
use crate::services::UpdateOutcome;

/// Recomputes setting-based statuses (and their aggregated parents) for a
/// batch of projects.
pub struct SettingsBasedUpdateService;

impl SettingsBasedUpdateService {
    /// Update `analyzer_type` for `project_ids`.
    ///
    /// More than [`MAX_PROJECT_IDS`](secinv_core::computation::MAX_PROJECT_IDS)
    /// projects is an error raised before anything is read. A missing or
    /// empty list, or a type with no backing setting, is a no-op.
    pub async fn execute(
        ctx: &StatusContext,
        project_ids: Option<&[DbId]>,
        analyzer_type: AnalyzerType,
    ) -> CoreResult<UpdateOutcome> {
        let project_ids = project_ids.unwrap_or_default();
        ensure_batch_within_limit(project_ids)?;

        let Some(source) = analyzer_type.setting_source() else {
            tracing::debug!(%analyzer_type, "No setting backs this analyzer type, skipping");
            return Ok(UpdateOutcome::skipped());
        };
        if project_ids.is_empty() {
            return Ok(UpdateOutcome::skipped());
        }

        let projects = ctx.hierarchy.project_contexts(project_ids).await?;
        let projects = filter_enabled_projects(ctx.gate.as_ref(), projects);
        if projects.is_empty() {
            return Ok(UpdateOutcome::skipped());
        }

        let ids: Vec<DbId> = projects.iter().map(|p| p.project_id).collect();
        let settings = ctx.hierarchy.security_settings(&ids, source.field).await?;

        let mut stored: HashMap<DbId, Vec<ProjectAnalyzerStatus>> = HashMap::new();
        for row in ctx.store.project_statuses(&ids).await? {
            stored.entry(row.project_id).or_default().push(row);
        }

        let updates: Vec<ProjectStatusUpdate> = projects
            .into_iter()
            .map(|project| {
                let enabled = setting_enabled(&settings, project.project_id);
                let project_stored = stored
                    .get(&project.project_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let computed = compute_setting_statuses(source, &project, enabled, project_stored);
                ProjectStatusUpdate {
                    project,
                    statuses: computed.into_values().collect(),
                }
            })
            .collect();

        let namespace_diffs = ctx.store.commit_statuses(&updates).await?;
        tracing::info!(
            analyzer_type = %source.analyzer_type,
            projects = updates.len(),
            namespaces = namespace_diffs.len(),
            "Updated setting-based analyzer statuses"
        );
        Ok(UpdateOutcome {
            projects_updated: updates.len(),
            namespace_diffs,
        })
    }
}
