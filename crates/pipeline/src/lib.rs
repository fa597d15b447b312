//! Orchestration of analyzer status updates.
//!
//! Each service wires the pure computations of `secinv_core` to the store
//! and hierarchy seams held by a [`StatusContext`]: compute, diff, upsert,
//! propagate.

pub mod context;
pub mod services;
pub mod tracking;

pub use context::StatusContext;
pub use services::UpdateOutcome;
pub use tracking::{ErrorContext, ErrorTracker, TracingErrorTracker};
