//! Core domain models
//!
//! This module defines the data structures that represent a pipeline
//! definition and its execution state: the YAML configuration layer and the
//! validated execution tree built from it.

pub mod config;
pub mod node;
pub mod state;

pub use config::PipelineFile;
pub use node::*;
pub use state::*;
