//! Execution tree domain model
//!
//! A pipeline is a tree of nodes: the pipeline owns jobs, jobs own steps.
//! Every node carries the same metadata (identity, enabled flag, declared
//! environment variables and properties, working directory and shell
//! overrides); only steps carry run lines.

use std::collections::BTreeMap;

/// Shell used to execute a resolved run line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shell {
    /// `bash -e -c`
    #[default]
    Default,
    /// `bash --noprofile --norc -eo pipefail -c`
    Bash,
    /// `sh -e -c`
    Sh,
}

impl Shell {
    /// Parse a declared shell name; `None` for anything unrecognized
    pub fn parse(input: &str) -> Option<Shell> {
        match input.trim().to_lowercase().as_str() {
            "" | "default" => Some(Shell::Default),
            "bash" => Some(Shell::Bash),
            "sh" => Some(Shell::Sh),
            _ => None,
        }
    }

    /// The full argv used to run `script`, program first
    pub fn command_tokens(&self, script: &str) -> Vec<String> {
        let mut tokens: Vec<String> = match self {
            Shell::Default => vec!["bash".into(), "-e".into(), "-c".into()],
            Shell::Bash => vec![
                "bash".into(),
                "--noprofile".into(),
                "--norc".into(),
                "-eo".into(),
                "pipefail".into(),
                "-c".into(),
            ],
            Shell::Sh => vec!["sh".into(), "-e".into(), "-c".into()],
        };
        tokens.push(script.to_string());
        tokens
    }
}

/// Decode an enabled flag value
///
/// `true`/`yes`/`on` enable, `false`/`no`/`off` disable, anything else is
/// rejected during validation.
pub fn parse_enabled(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Metadata common to every node in the execution tree
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Unique id; assigned positionally when not declared
    pub id: String,

    /// Declared display name
    pub name: Option<String>,

    /// Disabled nodes and their descendants are skipped without resolution
    pub enabled: bool,

    /// Environment variables declared on this node
    pub env: BTreeMap<String, String>,

    /// Properties declared on this node
    pub properties: BTreeMap<String, String>,

    /// Working directory override, resolvable
    pub working_directory: Option<String>,

    /// Shell override; inherited from the parent when unset
    pub shell: Option<Shell>,
}

impl NodeMeta {
    /// Console label, e.g. `@step id=[build] name=[Build]`
    pub fn label(&self, kind: &str) -> String {
        let mut s = format!("@{kind} id=[{}]", self.id);
        if let Some(name) = &self.name {
            if !name.trim().is_empty() {
                s.push_str(&format!(" name=[{}]", name.trim()));
            }
        }
        s
    }
}

/// Root of the execution tree
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub meta: NodeMeta,
    pub jobs: Vec<Job>,
}

/// An ordered group of steps, failed by its first failing step
#[derive(Debug, Clone)]
pub struct Job {
    pub meta: NodeMeta,
    pub steps: Vec<Step>,
}

/// Smallest executable unit: a sequence of run lines
#[derive(Debug, Clone)]
pub struct Step {
    pub meta: NodeMeta,
    /// Run lines in declaration order, continuation lines already merged
    pub runs: Vec<String>,
}

impl Pipeline {
    pub fn label(&self) -> String {
        self.meta.label("pipeline")
    }
}

impl Job {
    pub fn label(&self) -> String {
        self.meta.label("job")
    }

    /// Effective shell for a step of this job
    pub fn effective_shell(&self, pipeline: &Pipeline, step: &Step) -> Shell {
        step.meta
            .shell
            .or(self.meta.shell)
            .or(pipeline.meta.shell)
            .unwrap_or_default()
    }
}

impl Step {
    pub fn label(&self) -> String {
        self.meta.label("step")
    }
}
