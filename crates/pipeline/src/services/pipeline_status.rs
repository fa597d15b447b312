use secinv_core::computation::{compute_pipeline_statuses, PipelineSnapshot};
use secinv_core::error::CoreResult;
use secinv_core::status::ProjectStatusUpdate;

use crate::context::StatusContext;
use crate::services::UpdateOutcome;
use crate::tracking::ErrorContext;

/// Recomputes a project's pipeline-based statuses from a completed pipeline.
pub struct PipelineStatusUpdateService;

impl PipelineStatusUpdateService {
    /// Update statuses from `pipeline`.
    ///
    /// Skipped when the pipeline is missing, did not run on the default
    /// branch, its project is gone, or the project's root namespace is
    /// gated off. Errors are reported to the tracker with the project and
    /// pipeline IDs and then swallowed: nothing is written for a failed run.
    pub async fn execute(ctx: &StatusContext, pipeline: Option<&PipelineSnapshot>) -> UpdateOutcome {
        let Some(pipeline) = pipeline else {
            return UpdateOutcome::skipped();
        };
        if !pipeline.on_default_branch {
            tracing::debug!(
                pipeline_id = pipeline.id,
                "Pipeline not on default branch, skipping"
            );
            return UpdateOutcome::skipped();
        }

        match Self::update(ctx, pipeline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ctx.tracker
                    .track(&e, ErrorContext::pipeline(pipeline.project_id, pipeline.id));
                UpdateOutcome::skipped()
            }
        }
    }

    async fn update(ctx: &StatusContext, pipeline: &PipelineSnapshot) -> CoreResult<UpdateOutcome> {
        let Some(project) = ctx.hierarchy.project_context(pipeline.project_id).await? else {
            return Ok(UpdateOutcome::skipped());
        };
        if !ctx.gate.enabled(project.root_namespace_id()) {
            return Ok(UpdateOutcome::skipped());
        }

        let stored = ctx.store.project_statuses(&[project.project_id]).await?;
        let computed = compute_pipeline_statuses(pipeline, &project, &stored);
        if computed.is_empty() {
            return Ok(UpdateOutcome::skipped());
        }

        let project_id = project.project_id;
        let update = ProjectStatusUpdate {
            project,
            statuses: computed.into_values().collect(),
        };
        let namespace_diffs = ctx.store.commit_statuses(std::slice::from_ref(&update)).await?;

        tracing::info!(
            project_id,
            pipeline_id = pipeline.id,
            analyzers = update.statuses.len(),
            namespaces = namespace_diffs.len(),
            "Updated analyzer statuses from pipeline"
        );
        Ok(UpdateOutcome {
            projects_updated: 1,
            namespace_diffs,
        })
    }
}
