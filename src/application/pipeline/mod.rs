//! The job pipeline: input resolution, engine invocation, result collection.

pub mod error;
pub mod executor;
pub mod input;
pub mod invocation;
pub mod metadata;
pub mod process;
pub mod workspace;

pub use error::{JobError, KillReason, Tool};
pub use executor::RenderPipeline;
pub use invocation::{EngineConfig, Invocation};
pub use metadata::extract_print_metadata;
pub use process::{ProcessExit, ProcessRunner, SystemProcessRunner};
