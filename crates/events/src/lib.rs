//! Analyzer status events and their transport.
//!
//! - [`AnalyzerEvent`]: the typed event envelope, tagged by `event_type`.
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`EventPersistence`]: background service that appends every published
//!   event to the `analyzer_status_events` outbox.

pub mod bus;
pub mod error;
pub mod event;
pub mod persistence;

pub use bus::EventBus;
pub use error::EventError;
pub use event::AnalyzerEvent;
pub use persistence::EventPersistence;
