//! pipewright - a YAML pipeline runner
//!
//! Executes pipelines of shell steps defined in YAML, with layered
//! environment variables and properties, `${{ name }}` interpolation and a
//! small set of engine directives.

pub mod cli;
pub mod core;
pub mod engine;
pub mod error;

// Re-export commonly used types
pub use core::{Job, NodeStatus, Pipeline, PipelineFile, Shell, Step};
pub use engine::{EngineOptions, ExecutionEngine, PipelineReport, ProcessRunner, ShellRunner};
pub use error::EngineError;
