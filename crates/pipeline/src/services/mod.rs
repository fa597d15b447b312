//! Status services, one per trigger.

pub mod ancestors;
pub mod archived;
pub mod group_lifecycle;
pub mod pipeline_status;
pub mod project_lifecycle;
pub mod settings_based;
pub mod traversal_ids;

pub use ancestors::AncestorsUpdateService;
pub use archived::ArchivedUpdateService;
pub use group_lifecycle::{GroupDeletedService, GroupTransferService};
pub use pipeline_status::PipelineStatusUpdateService;
pub use project_lifecycle::{ProjectDeletedService, ProjectTransferService};
pub use settings_based::SettingsBasedUpdateService;
pub use traversal_ids::{TraversalIdsUpdateService, TRAVERSAL_REWRITE_BATCH_SIZE};

use secinv_core::diff::NamespaceDiff;

/// What a status update wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Projects whose rows were upserted.
    pub projects_updated: usize,
    /// Namespace diffs propagated to ancestor counters.
    pub namespace_diffs: Vec<NamespaceDiff>,
}

impl UpdateOutcome {
    /// Nothing was written.
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.projects_updated == 0 && self.namespace_diffs.is_empty()
    }
}
