//! Bounded render, export and slice pipeline around external geometry and slicer engines.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
mod util;
