//! Domain events that drive analyzer status updates.

use secinv_core::analyzer::AnalyzerType;
use secinv_core::computation::PipelineSnapshot;
use secinv_core::types::{DbId, TraversalIds};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event type names
// ---------------------------------------------------------------------------

pub const EVENT_PIPELINE_COMPLETED: &str = "pipeline_completed";
pub const EVENT_SECURITY_SETTING_CHANGED: &str = "security_setting_changed";
pub const EVENT_PROJECT_ARCHIVED: &str = "project_archived";
pub const EVENT_PROJECT_DELETED: &str = "project_deleted";
pub const EVENT_PROJECT_TRANSFERRED: &str = "project_transferred";
pub const EVENT_GROUP_TRANSFERRED: &str = "group_transferred";
pub const EVENT_GROUP_DELETED: &str = "group_deleted";

// ---------------------------------------------------------------------------
// AnalyzerEvent
// ---------------------------------------------------------------------------

/// An event the status engine reacts to.
///
/// Serialized with an `event_type` tag so the outbox payload is
/// self-describing:
///
/// ```json
/// {"event_type": "project_archived", "project_id": 42}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AnalyzerEvent {
    /// A CI pipeline finished.
    PipelineCompleted { pipeline: PipelineSnapshot },

    /// A security setting changed for a set of projects. `analyzer_type` is
    /// the settings-backed category (`secret_detection`,
    /// `container_scanning`) or the setting type itself.
    SecuritySettingChanged {
        #[serde(default)]
        project_ids: Option<Vec<DbId>>,
        analyzer_type: AnalyzerType,
    },

    /// A project was archived or unarchived. The current flag is read from
    /// the hierarchy when the event is handled.
    ProjectArchived { project_id: DbId },

    /// A project was deleted. Carries its location at deletion time because
    /// the hierarchy no longer knows it.
    ProjectDeleted {
        project_id: DbId,
        namespace_id: DbId,
        traversal_ids: TraversalIds,
    },

    /// A project moved to another namespace.
    ProjectTransferred {
        project_id: DbId,
        old_namespace_id: DbId,
        old_traversal_ids: TraversalIds,
    },

    /// A group moved under another parent (or became a root).
    GroupTransferred {
        group_id: DbId,
        old_traversal_ids: TraversalIds,
    },

    /// A group was deleted.
    GroupDeleted {
        group_id: DbId,
        traversal_ids: TraversalIds,
    },
}

impl AnalyzerEvent {
    /// The `event_type` tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineCompleted { .. } => EVENT_PIPELINE_COMPLETED,
            Self::SecuritySettingChanged { .. } => EVENT_SECURITY_SETTING_CHANGED,
            Self::ProjectArchived { .. } => EVENT_PROJECT_ARCHIVED,
            Self::ProjectDeleted { .. } => EVENT_PROJECT_DELETED,
            Self::ProjectTransferred { .. } => EVENT_PROJECT_TRANSFERRED,
            Self::GroupTransferred { .. } => EVENT_GROUP_TRANSFERRED,
            Self::GroupDeleted { .. } => EVENT_GROUP_DELETED,
        }
    }

    /// The project the event concerns, if it concerns a single project.
    pub fn project_id(&self) -> Option<DbId> {
        match self {
            Self::PipelineCompleted { pipeline } => Some(pipeline.project_id),
            Self::ProjectArchived { project_id }
            | Self::ProjectDeleted { project_id, .. }
            | Self::ProjectTransferred { project_id, .. } => Some(*project_id),
            _ => None,
        }
    }

    /// The group the event concerns, if any.
    pub fn group_id(&self) -> Option<DbId> {
        match self {
            Self::GroupTransferred { group_id, .. } | Self::GroupDeleted { group_id, .. } => {
                Some(*group_id)
            }
            _ => None,
        }
    }
}
