//! Execution engine
//!
//! Everything between a validated pipeline definition and a process exit
//! code: tokenization, variable resolution, the execution walk, shell
//! process handling and directives.

pub mod directive;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod process;
pub mod resolver;
pub mod store;
pub mod tokenizer;

pub use engine::{EngineOptions, ExecutionEngine, PipelineReport};
pub use process::{ProcessOutput, ProcessRequest, ProcessRunner, ShellRunner};
pub use resolver::{ResolvePolicy, Resolver};
pub use store::VariableStore;
