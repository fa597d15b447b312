//! Background worker that keeps analyzer status counters current.
//!
//! - [`config`]: environment configuration.
//! - [`dispatcher`]: routes each event to its status service.
//! - [`outbox`]: drains the `analyzer_status_events` outbox.
//! - [`sweep`]: periodic settings-based recomputation.

pub mod config;
pub mod dispatcher;
pub mod outbox;
pub mod sweep;

pub use config::{LogFormat, WorkerConfig};
pub use dispatcher::EventDispatcher;
pub use outbox::{OutboxPoller, PollSummary};
pub use sweep::SettingsSweep;
