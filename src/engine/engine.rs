//! Pipeline execution engine
//!
//! Walks the execution tree depth-first: pipeline, jobs in order, steps in
//! order, run lines in order. The first non-zero exit code at any level
//! stops that level and skips the remaining siblings. Each step gets a
//! fresh variable snapshot built from its ancestor chain, so nothing a step
//! does can leak into a sibling except through an explicit output capture.

use crate::cli::output::Console;
use crate::core::node::{Job, Pipeline, Shell, Step};
use crate::core::state::{NodeResult, NodeStatus};
use crate::core::PipelineFile;
use crate::engine::directive::{self, Directive};
use crate::engine::process::{ProcessRequest, ProcessRunner};
use crate::engine::resolver::{ResolvePolicy, Resolver};
use crate::engine::store::{scoped_keys, VariableStore};
use crate::error::EngineError;
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Environment variable carrying the engine version into every process
pub const VERSION_ENV: &str = "PIPEWRIGHT_VERSION";

/// Property that switches command echo to the unresolved text
const MASK_PROPERTY: &str = "pipeline.properties";

const CAPTURE_APPEND_REGEX: &str = r"^.*>>\s*\$[A-Za-z0-9][A-Za-z0-9\-._]*$";
const CAPTURE_OVERWRITE_REGEX: &str = r"^.*>\s*\$[A-Za-z0-9][A-Za-z0-9\-._]*$";

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Prefix every console line with a timestamp
    pub timestamps: bool,

    /// What to do with properties still unresolved in a stable output
    pub policy: ResolvePolicy,

    /// Highest-precedence property overrides (`run --with key=value`)
    pub overrides: BTreeMap<String, String>,
}

/// Terminal state of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub id: String,
    pub status: NodeStatus,
    pub exit_code: i32,
}

/// Terminal state of one job and its steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: String,
    pub status: NodeStatus,
    pub exit_code: i32,
    pub steps: Vec<StepReport>,
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub id: String,
    pub status: NodeStatus,
    pub exit_code: i32,
    pub jobs: Vec<JobReport>,
}

/// Mutable state owned by one engine run
///
/// Captured outputs live here instead of being written back into any node's
/// property map, so node definitions stay immutable during execution.
#[derive(Debug, Default)]
pub struct RunContext {
    captures: BTreeMap<String, String>,
}

impl RunContext {
    fn store_capture(&mut self, id_chain: &[String], name: &str, text: &str, append: bool) {
        for key in scoped_keys(id_chain, name) {
            if append {
                let value = self.captures.entry(key).or_default();
                value.push_str(text);
            } else {
                self.captures.insert(key, text.to_string());
            }
        }
    }

    #[cfg(test)]
    pub fn capture(&self, key: &str) -> Option<&str> {
        self.captures.get(key).map(String::as_str)
    }
}

enum CaptureMode {
    None,
    Overwrite(String),
    Append(String),
}

/// The execution engine, generic over how processes actually run
pub struct ExecutionEngine<R> {
    runner: R,
    console: Console,
    options: EngineOptions,
    capture_append: Regex,
    capture_overwrite: Regex,
}

impl<R: ProcessRunner> ExecutionEngine<R> {
    pub fn new(runner: R, options: EngineOptions) -> Self {
        let console = Console::new(options.timestamps);
        ExecutionEngine {
            runner,
            console,
            options,
            capture_append: Regex::new(CAPTURE_APPEND_REGEX).unwrap(),
            capture_overwrite: Regex::new(CAPTURE_OVERWRITE_REGEX).unwrap(),
        }
    }

    /// Load, validate and execute a pipeline definition file
    pub async fn execute_file(&self, path: &Path) -> anyhow::Result<PipelineReport> {
        let pipeline = PipelineFile::from_file(path)?.into_pipeline()?;
        Ok(self.execute(&pipeline).await)
    }

    /// Execute a pipeline; the report's exit code is the process exit code
    pub async fn execute(&self, pipeline: &Pipeline) -> PipelineReport {
        let mut resolver = Resolver::new(self.options.policy);
        let mut context = RunContext::default();
        self.execute_pipeline(pipeline, &mut resolver, &mut context)
            .await
    }

    async fn execute_pipeline(
        &self,
        pipeline: &Pipeline,
        resolver: &mut Resolver,
        context: &mut RunContext,
    ) -> PipelineReport {
        let execution_id = Uuid::new_v4();
        info!("executing pipeline [{}] as {}", pipeline.meta.id, execution_id);

        if !pipeline.meta.enabled {
            self.console.skipped(&pipeline.label());
            let jobs = pipeline.jobs.iter().map(|job| self.skip_job(job)).collect();
            return PipelineReport {
                execution_id,
                id: pipeline.meta.id.clone(),
                status: NodeStatus::Skipped,
                exit_code: 0,
                jobs,
            };
        }

        let started = Instant::now();
        self.console.executing(&pipeline.label());

        let mut exit_code = 0;
        let mut jobs = Vec::with_capacity(pipeline.jobs.len());
        for job in &pipeline.jobs {
            if exit_code != 0 {
                jobs.push(self.skip_job(job));
                continue;
            }
            let report = self.execute_job(pipeline, job, resolver, context).await;
            exit_code = report.exit_code;
            jobs.push(report);
        }

        let status = if exit_code == 0 {
            NodeStatus::Passed
        } else {
            NodeStatus::Failed
        };
        let result = NodeResult {
            status,
            exit_code,
            elapsed_ms: started.elapsed().as_millis(),
        };
        self.console.finished(&pipeline.label(), &result);

        PipelineReport {
            execution_id,
            id: pipeline.meta.id.clone(),
            status,
            exit_code,
            jobs,
        }
    }

    async fn execute_job(
        &self,
        pipeline: &Pipeline,
        job: &Job,
        resolver: &mut Resolver,
        context: &mut RunContext,
    ) -> JobReport {
        if !job.meta.enabled {
            return self.skip_job(job);
        }

        let started = Instant::now();
        self.console.executing(&job.label());

        let mut exit_code = 0;
        let mut steps = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            if exit_code != 0 {
                steps.push(self.skip_step(step));
                continue;
            }
            let report = self.execute_step(pipeline, job, step, resolver, context).await;
            exit_code = report.exit_code;
            steps.push(report);
        }

        let status = if exit_code == 0 {
            NodeStatus::Passed
        } else {
            NodeStatus::Failed
        };
        let result = NodeResult {
            status,
            exit_code,
            elapsed_ms: started.elapsed().as_millis(),
        };
        self.console.finished(&job.label(), &result);

        JobReport {
            id: job.meta.id.clone(),
            status,
            exit_code,
            steps,
        }
    }

    async fn execute_step(
        &self,
        pipeline: &Pipeline,
        job: &Job,
        step: &Step,
        resolver: &mut Resolver,
        context: &mut RunContext,
    ) -> StepReport {
        if !step.meta.enabled {
            return self.skip_step(step);
        }

        let started = Instant::now();
        self.console.executing(&step.label());

        let exit_code = match self
            .run_step_lines(pipeline, job, step, resolver, context)
            .await
        {
            Ok(code) => code,
            Err(e) => {
                self.console.error(e.to_string());
                1
            }
        };

        let status = if exit_code == 0 {
            NodeStatus::Passed
        } else {
            NodeStatus::Failed
        };
        let result = NodeResult {
            status,
            exit_code,
            elapsed_ms: started.elapsed().as_millis(),
        };
        self.console.finished(&step.label(), &result);

        StepReport {
            id: step.meta.id.clone(),
            status,
            exit_code,
        }
    }

    async fn run_step_lines(
        &self,
        pipeline: &Pipeline,
        job: &Job,
        step: &Step,
        resolver: &mut Resolver,
        context: &mut RunContext,
    ) -> Result<i32, EngineError> {
        let store = self.build_store(pipeline, job, step, context);

        let raw_directory = step
            .meta
            .working_directory
            .as_deref()
            .or(job.meta.working_directory.as_deref())
            .or(pipeline.meta.working_directory.as_deref())
            .unwrap_or(".");
        let working_directory = PathBuf::from(resolver.resolve(raw_directory, &store)?);

        let shell = job.effective_shell(pipeline, step);
        let masked = store.property(MASK_PROPERTY) == Some("mask");
        let step_chain = [
            pipeline.meta.id.clone(),
            job.meta.id.clone(),
            step.meta.id.clone(),
        ];

        for line in &step.runs {
            // Rebuilt per line so a capture from an earlier run line of this
            // step is already visible to the next one
            let store = self.build_store(pipeline, job, step, context);

            if Directive::is_directive(line) {
                let resolved = resolver.resolve_strict(line, &store)?;
                self.console.command(echoed(masked, line, &resolved));
                let parsed = Directive::parse(&resolved)?;
                let code = self
                    .run_directive(parsed, &store, &working_directory, shell, resolver, context)
                    .await?;
                if code != 0 {
                    return Ok(code);
                }
                continue;
            }

            // Unresolved properties fail the step here, before any spawn
            let resolved = resolver.resolve_strict(line, &store)?;
            let (command, capture) = self.split_capture(&resolved);

            self.console.command(echoed(masked, line, &resolved));

            debug!("running [{}] in [{}]", command, working_directory.display());
            let output = self
                .runner
                .run(ProcessRequest {
                    shell,
                    command,
                    working_directory: working_directory.clone(),
                    env: store.env_vars().clone(),
                })
                .await;

            match capture {
                CaptureMode::None => {
                    for line in &output.lines {
                        self.console.output(line.text());
                    }
                }
                CaptureMode::Overwrite(name) => {
                    let text = collect_output(&output.lines);
                    context.store_capture(&step_chain, &name, &text, false);
                }
                CaptureMode::Append(name) => {
                    let text = collect_output(&output.lines);
                    context.store_capture(&step_chain, &name, &text, true);
                }
            }

            if output.exit_code != 0 {
                return Ok(output.exit_code);
            }
        }

        Ok(0)
    }

    async fn run_directive(
        &self,
        parsed: Directive,
        store: &VariableStore,
        working_directory: &Path,
        shell: Shell,
        resolver: &mut Resolver,
        context: &mut RunContext,
    ) -> Result<i32, EngineError> {
        match parsed {
            Directive::PrintInfo(message) => {
                self.console.info(message);
                Ok(0)
            }
            Directive::PrintError(message) => {
                self.console.error(message);
                Ok(0)
            }
            Directive::ShaChecksum { file, expected } => {
                let path = working_directory.join(file);
                match directive::verify_checksum(&path, &expected) {
                    Ok(()) => Ok(0),
                    Err(e) => {
                        self.console.error(e.to_string());
                        Ok(1)
                    }
                }
            }
            Directive::Extension {
                file,
                expected_checksum,
            } => {
                self.run_extension(&file, expected_checksum.as_deref(), store, working_directory, shell)
                    .await
            }
            Directive::Pipeline { file } => {
                let path = working_directory.join(&file);
                let pipeline = match PipelineFile::from_file(&path)
                    .and_then(PipelineFile::into_pipeline)
                {
                    Ok(pipeline) => pipeline,
                    Err(e) => {
                        self.console.error(format!("invalid pipeline [{file}]: {e}"));
                        return Ok(1);
                    }
                };
                // Recursive call through a boxed future
                let nested: Pin<Box<dyn Future<Output = PipelineReport> + '_>> =
                    Box::pin(self.execute_pipeline(&pipeline, resolver, context));
                let report = nested.await;
                Ok(report.exit_code)
            }
        }
    }

    async fn run_extension(
        &self,
        file: &str,
        expected_checksum: Option<&str>,
        store: &VariableStore,
        working_directory: &Path,
        shell: Shell,
    ) -> Result<i32, EngineError> {
        let archive = working_directory.join(file);
        if let Some(expected) = expected_checksum {
            if let Err(e) = directive::verify_checksum(&archive, expected) {
                self.console.error(e.to_string());
                return Ok(1);
            }
        }

        // The scratch directory is removed on drop, pass or fail
        let scratch = tempfile::TempDir::new()?;
        let archive_path = archive.display().to_string();
        let dest = scratch.path().display().to_string();

        let extract = directive::extraction_command(&archive_path, &dest);

        let output = self
            .runner
            .run(ProcessRequest {
                shell: Shell::Default,
                command: extract,
                working_directory: working_directory.to_path_buf(),
                env: store.env_vars().clone(),
            })
            .await;
        for line in &output.lines {
            self.console.output(line.text());
        }
        if !output.success() {
            return Ok(output.exit_code);
        }

        let output = self
            .runner
            .run(ProcessRequest {
                shell,
                command: "./run.sh".to_string(),
                working_directory: scratch.path().to_path_buf(),
                env: store.env_vars().clone(),
            })
            .await;
        for line in &output.lines {
            self.console.output(line.text());
        }
        Ok(output.exit_code)
    }

    /// Merge the variable layers visible to one step, narrowest last
    fn build_store(
        &self,
        pipeline: &Pipeline,
        job: &Job,
        step: &Step,
        context: &RunContext,
    ) -> VariableStore {
        let mut store = VariableStore::with_process_env();
        store.merge_env(&pipeline.meta.env);
        store.merge_env(&job.meta.env);
        store.merge_env(&step.meta.env);
        // Set last so no node-declared variable can shadow it
        store.set_env(VERSION_ENV, env!("CARGO_PKG_VERSION"));

        let pipeline_chain = [pipeline.meta.id.clone()];
        let job_chain = [pipeline.meta.id.clone(), job.meta.id.clone()];
        let step_chain = [
            pipeline.meta.id.clone(),
            job.meta.id.clone(),
            step.meta.id.clone(),
        ];
        store.merge_properties(&pipeline_chain, &pipeline.meta.properties);
        store.merge_properties(&job_chain, &job.meta.properties);
        store.merge_properties(&step_chain, &step.meta.properties);

        for (key, value) in &context.captures {
            store.set_property(key.clone(), value.clone());
        }

        store.merge_properties(&pipeline_chain, &self.options.overrides);

        store
    }

    fn split_capture(&self, resolved: &str) -> (String, CaptureMode) {
        if self.capture_append.is_match(resolved) {
            let name = capture_name(resolved);
            let cut = resolved.rfind(">>").unwrap_or(resolved.len());
            (
                resolved[..cut].trim_end().to_string(),
                CaptureMode::Append(name),
            )
        } else if self.capture_overwrite.is_match(resolved) {
            let name = capture_name(resolved);
            let cut = resolved.rfind('>').unwrap_or(resolved.len());
            (
                resolved[..cut].trim_end().to_string(),
                CaptureMode::Overwrite(name),
            )
        } else {
            (resolved.to_string(), CaptureMode::None)
        }
    }

    fn skip_job(&self, job: &Job) -> JobReport {
        self.console.skipped(&job.label());
        let steps = job.steps.iter().map(|step| self.skip_step(step)).collect();
        JobReport {
            id: job.meta.id.clone(),
            status: NodeStatus::Skipped,
            exit_code: 0,
            steps,
        }
    }

    fn skip_step(&self, step: &Step) -> StepReport {
        self.console.skipped(&step.label());
        StepReport {
            id: step.meta.id.clone(),
            status: NodeStatus::Skipped,
            exit_code: 0,
        }
    }
}

/// The command text echoed before dispatch; masking echoes the raw line so
/// substituted values never reach the console
fn echoed<'a>(masked: bool, raw: &'a str, resolved: &'a str) -> &'a str {
    if masked {
        raw
    } else {
        resolved
    }
}

fn capture_name(resolved: &str) -> String {
    match resolved.rfind('$') {
        Some(i) => resolved[i + 1..].to_string(),
        None => String::new(),
    }
}

fn collect_output(lines: &[crate::engine::process::OutputLine]) -> String {
    lines
        .iter()
        .map(|line| line.text())
        .collect::<Vec<_>>()
        .join("\n")
}
