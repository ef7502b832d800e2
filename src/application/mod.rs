//! Application services: the job pipeline and queue, cost estimation, and
//! customizer-variable discovery.

pub mod cost;
pub mod customizer;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod profiles;
