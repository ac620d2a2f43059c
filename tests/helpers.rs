//! Test utility functions for pipewright

use async_trait::async_trait;
use pipewright::core::PipelineFile;
use pipewright::engine::process::{OutputLine, ProcessOutput, ProcessRequest, ProcessRunner};
use pipewright::engine::{EngineOptions, ExecutionEngine, PipelineReport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted process runner that records every request
///
/// Responses are consumed in order; once the script runs out, every further
/// command passes with no output.
#[derive(Clone, Default)]
pub struct MockRunner {
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
    responses: Arc<Mutex<VecDeque<ProcessOutput>>>,
}

impl MockRunner {
    /// A runner where every command succeeds silently
    pub fn passing() -> Self {
        MockRunner::default()
    }

    /// A runner that plays back the given outputs in order
    pub fn scripted(outputs: Vec<ProcessOutput>) -> Self {
        MockRunner {
            requests: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(outputs.into())),
        }
    }

    /// Every request the engine issued, in order
    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The command strings the engine issued, in order
    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, request: ProcessRequest) -> ProcessOutput {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProcessOutput {
                exit_code: 0,
                lines: Vec::new(),
            })
    }
}

/// Successful output with the given stdout lines
pub fn passing_output(lines: &[&str]) -> ProcessOutput {
    ProcessOutput {
        exit_code: 0,
        lines: lines
            .iter()
            .map(|l| OutputLine::Stdout(l.to_string()))
            .collect(),
    }
}

/// Failed output with the given exit code
pub fn failing_output(exit_code: i32) -> ProcessOutput {
    ProcessOutput {
        exit_code,
        lines: Vec::new(),
    }
}

/// Parse a YAML definition and execute it against the given runner
pub async fn run_yaml(yaml: &str, runner: MockRunner) -> PipelineReport {
    run_yaml_with_options(yaml, runner, EngineOptions::default()).await
}

pub async fn run_yaml_with_options(
    yaml: &str,
    runner: MockRunner,
    options: EngineOptions,
) -> PipelineReport {
    let pipeline = PipelineFile::from_yaml(yaml)
        .expect("pipeline should parse")
        .into_pipeline()
        .expect("pipeline should convert");
    ExecutionEngine::new(runner, options).execute(&pipeline).await
}
