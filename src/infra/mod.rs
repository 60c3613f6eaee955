//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod lines;
pub(crate) mod lock;
pub mod store;
pub mod telemetry;
