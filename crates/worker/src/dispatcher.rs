//! Routes analyzer events to the status services.

use secinv_core::error::CoreResult;
use secinv_core::status::ProjectContext;
use secinv_events::AnalyzerEvent;
use secinv_pipeline::services::{
    ArchivedUpdateService, GroupDeletedService, GroupTransferService, PipelineStatusUpdateService,
    ProjectDeletedService, ProjectTransferService, SettingsBasedUpdateService,
};
use secinv_pipeline::StatusContext;

/// Maps each [`AnalyzerEvent`] to the service that handles it.
#[derive(Clone)]
pub struct EventDispatcher {
    ctx: StatusContext,
}

impl EventDispatcher {
    pub fn new(ctx: StatusContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &StatusContext {
        &self.ctx
    }

    /// Handle a single event.
    ///
    /// Pipeline failures are tracked inside the pipeline service and never
    /// surface here; every other failure is returned so the caller can retry.
    pub async fn handle(&self, event: &AnalyzerEvent) -> CoreResult<()> {
        let ctx = &self.ctx;
        match event {
            AnalyzerEvent::PipelineCompleted { pipeline } => {
                PipelineStatusUpdateService::execute(ctx, Some(pipeline)).await;
            }
            AnalyzerEvent::SecuritySettingChanged {
                project_ids,
                analyzer_type,
            } => {
                SettingsBasedUpdateService::execute(ctx, project_ids.as_deref(), *analyzer_type)
                    .await?;
            }
            AnalyzerEvent::ProjectArchived { project_id } => {
                ArchivedUpdateService::execute(ctx, *project_id).await?;
            }
            AnalyzerEvent::ProjectDeleted {
                project_id,
                namespace_id,
                traversal_ids,
            } => {
                let project = ProjectContext {
                    project_id: *project_id,
                    namespace_id: *namespace_id,
                    traversal_ids: traversal_ids.clone(),
                    archived: false,
                };
                ProjectDeletedService::execute(ctx, &project).await?;
            }
            AnalyzerEvent::ProjectTransferred {
                project_id,
                old_namespace_id,
                old_traversal_ids,
            } => {
                ProjectTransferService::execute(
                    ctx,
                    *project_id,
                    *old_namespace_id,
                    old_traversal_ids,
                )
                .await?;
            }
            AnalyzerEvent::GroupTransferred {
                group_id,
                old_traversal_ids,
            } => {
                GroupTransferService::execute(ctx, *group_id, old_traversal_ids).await?;
            }
            AnalyzerEvent::GroupDeleted {
                group_id,
                traversal_ids,
            } => {
                GroupDeletedService::execute(ctx, *group_id, traversal_ids).await?;
            }
        }
        Ok(())
    }
}
