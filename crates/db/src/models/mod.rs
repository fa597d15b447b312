pub mod analyzer_status;
pub mod hierarchy;
pub mod status_event;
