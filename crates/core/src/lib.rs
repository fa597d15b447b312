pub mod analyzer;
pub mod computation;
pub mod diff;
pub mod error;
pub mod feature_gate;
pub mod memory;
pub mod status;
pub mod store;
pub mod traversal;
pub mod types;
