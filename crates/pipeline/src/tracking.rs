//! Reporting of errors that are handled rather than propagated.

use secinv_core::error::CoreError;
use secinv_core::types::DbId;

/// Identifiers attached to a tracked error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub project_id: Option<DbId>,
    pub pipeline_id: Option<DbId>,
}

impl ErrorContext {
    pub fn pipeline(project_id: DbId, pipeline_id: DbId) -> Self {
        Self {
            project_id: Some(project_id),
            pipeline_id: Some(pipeline_id),
        }
    }
}

/// Sink for errors that are swallowed after being reported.
pub trait ErrorTracker: Send + Sync {
    fn track(&self, error: &CoreError, context: ErrorContext);
}

/// Reports tracked errors as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorTracker;

impl ErrorTracker for TracingErrorTracker {
    fn track(&self, error: &CoreError, context: ErrorContext) {
        tracing::error!(
            error = %error,
            project_id = ?context.project_id,
            pipeline_id = ?context.pipeline_id,
            "Analyzer status update failed"
        );
    }
}
