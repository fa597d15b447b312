//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Read methods accept `&PgPool`; methods that must run inside a caller's
//! transaction accept `&mut PgConnection` (pass `&mut *tx`).

pub mod analyzer_namespace_status_repo;
pub mod analyzer_project_status_repo;
pub mod namespace_repo;
pub mod project_repo;
pub mod security_setting_repo;
pub mod status_event_repo;

pub use analyzer_namespace_status_repo::AnalyzerNamespaceStatusRepo;
pub use analyzer_project_status_repo::AnalyzerProjectStatusRepo;
pub use namespace_repo::NamespaceRepo;
pub use project_repo::ProjectRepo;
pub use security_setting_repo::SecuritySettingRepo;
pub use status_event_repo::StatusEventRepo;
