//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod profiles;
pub mod storage;
pub mod telemetry;
