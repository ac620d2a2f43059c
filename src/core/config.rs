//! Pipeline definition from YAML
//!
//! The YAML shape mirrors the common CI convention: a top level `pipeline`
//! with `jobs`, each job with `steps`, each step with a multi-line `run`
//! string. Declared names map to canonical fields through explicit serde
//! renames (`with` holds properties, `working-directory` the directory
//! override). Scalars are accepted wherever YAML would naturally produce a
//! boolean or number and normalized to strings on conversion.

use crate::core::node::{parse_enabled, Job, NodeMeta, Pipeline, Shell, Step};
use crate::engine::tokenizer::{is_valid_property, tokenize};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level document: `pipeline:` is the only root key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    pub pipeline: PipelineConfig,
}

/// Pipeline as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    #[serde(default)]
    pub id: Option<String>,

    /// Enabled flag; YAML booleans and the word vocabulary are both accepted
    #[serde(default)]
    pub enabled: Option<Value>,

    /// Environment variables declared on the pipeline
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Properties declared on the pipeline
    #[serde(default, rename = "with")]
    pub with: BTreeMap<String, Value>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    pub jobs: Vec<JobConfig>,
}

/// Job as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub enabled: Option<Value>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default, rename = "with")]
    pub with: BTreeMap<String, Value>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    pub steps: Vec<StepConfig>,
}

/// Step as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub enabled: Option<Value>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default, rename = "with")]
    pub with: BTreeMap<String, Value>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    /// One or more shell command lines; trailing-backslash lines continue
    /// onto the next line
    pub run: String,
}

impl PipelineFile {
    /// Load and validate a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PipelineFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate the whole definition tree
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;

        let mut seen_ids = HashSet::new();
        validate_node(
            "pipeline",
            &p.name,
            &p.id,
            &p.enabled,
            &p.env,
            &p.with,
            &p.shell,
            &mut seen_ids,
        )?;

        if p.jobs.is_empty() {
            bail!("pipeline '{}' has no jobs", p.name);
        }

        for job in &p.jobs {
            validate_node(
                "job",
                &job.name,
                &job.id,
                &job.enabled,
                &job.env,
                &job.with,
                &job.shell,
                &mut seen_ids,
            )?;

            if job.steps.is_empty() {
                bail!("job '{}' has no steps", job.name);
            }

            for step in &job.steps {
                validate_node(
                    "step",
                    &step.name,
                    &step.id,
                    &step.enabled,
                    &step.env,
                    &step.with,
                    &step.shell,
                    &mut seen_ids,
                )?;

                let runs = merge_run_lines(&step.run);
                if runs.is_empty() {
                    bail!("step '{}' has a blank run", step.name);
                }
                for line in &runs {
                    if let Err(e) = tokenize(line) {
                        bail!("step '{}': {}", step.name, e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert the validated definition into the execution tree, assigning
    /// positional ids to nodes that did not declare one
    pub fn into_pipeline(self) -> Result<Pipeline> {
        let p = self.pipeline;
        let pipeline_id = p.id.clone().unwrap_or_else(|| "pipeline.1".to_string());

        let mut jobs = Vec::with_capacity(p.jobs.len());
        for (j, job) in p.jobs.into_iter().enumerate() {
            let job_id = job
                .id
                .clone()
                .unwrap_or_else(|| format!("{}.job.{}", pipeline_id, j + 1));

            let mut steps = Vec::with_capacity(job.steps.len());
            for (s, step) in job.steps.into_iter().enumerate() {
                let step_id = step
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}.step.{}", job_id, s + 1));
                let runs = merge_run_lines(&step.run);
                steps.push(Step {
                    meta: node_meta(
                        step_id,
                        step.name,
                        &step.enabled,
                        step.env,
                        step.with,
                        step.working_directory,
                        &step.shell,
                    )?,
                    runs,
                });
            }

            jobs.push(Job {
                meta: node_meta(
                    job_id,
                    job.name,
                    &job.enabled,
                    job.env,
                    job.with,
                    job.working_directory,
                    &job.shell,
                )?,
                steps,
            });
        }

        Ok(Pipeline {
            meta: node_meta(
                pipeline_id,
                p.name,
                &p.enabled,
                p.env,
                p.with,
                p.working_directory,
                &p.shell,
            )?,
            jobs,
        })
    }
}

/// Split a `run` string into executable lines, merging continuations
///
/// A line whose trimmed text ends with a backslash is joined with the next
/// line; blank lines are dropped.
pub fn merge_run_lines(run: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();

    for raw in run.lines() {
        let line = raw.trim();
        if line.is_empty() && pending.is_empty() {
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped.trim_end());
            pending.push(' ');
        } else {
            pending.push_str(line);
            let merged = pending.trim().to_string();
            pending.clear();
            if !merged.is_empty() {
                lines.push(merged);
            }
        }
    }

    let trailing = pending.trim().to_string();
    if !trailing.is_empty() {
        lines.push(trailing);
    }

    lines
}

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => bail!("value for '{}' must be a scalar", key),
    }
}

fn decode_enabled(kind: &str, name: &str, enabled: &Option<Value>) -> Result<bool> {
    match enabled {
        None => Ok(true),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match parse_enabled(s) {
            Some(b) => Ok(b),
            None => bail!("{} '{}' has invalid enabled value '{}'", kind, name, s),
        },
        Some(other) => bail!("{} '{}' has invalid enabled value {:?}", kind, name, other),
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_node(
    kind: &str,
    name: &str,
    id: &Option<String>,
    enabled: &Option<Value>,
    env: &BTreeMap<String, Value>,
    with: &BTreeMap<String, Value>,
    shell: &Option<String>,
    seen_ids: &mut HashSet<String>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("{} name is blank", kind);
    }

    if let Some(id) = id {
        if !is_valid_property(id) {
            bail!("{} '{}' has invalid id '{}'", kind, name, id);
        }
        if !seen_ids.insert(id.clone()) {
            bail!("duplicate id '{}'", id);
        }
    }

    decode_enabled(kind, name, enabled)?;

    for (key, value) in env {
        if !is_valid_env_key(key) {
            bail!("{} '{}' has invalid env key '{}'", kind, name, key);
        }
        scalar_to_string(key, value)?;
    }

    for (key, value) in with {
        if !is_valid_property(key) {
            bail!("{} '{}' has invalid property key '{}'", kind, name, key);
        }
        scalar_to_string(key, value)?;
    }

    if let Some(shell) = shell {
        if Shell::parse(shell).is_none() {
            bail!("{} '{}' has unknown shell '{}'", kind, name, shell);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn node_meta(
    id: String,
    name: String,
    enabled: &Option<Value>,
    env: BTreeMap<String, Value>,
    with: BTreeMap<String, Value>,
    working_directory: Option<String>,
    shell: &Option<String>,
) -> Result<NodeMeta> {
    let enabled = decode_enabled("node", &name, enabled)?;

    let mut env_map = BTreeMap::new();
    for (key, value) in &env {
        env_map.insert(key.clone(), scalar_to_string(key, value)?);
    }

    let mut prop_map = BTreeMap::new();
    for (key, value) in &with {
        prop_map.insert(key.clone(), scalar_to_string(key, value)?);
    }

    Ok(NodeMeta {
        id,
        name: Some(name),
        enabled,
        env: env_map,
        properties: prop_map,
        working_directory,
        shell: shell.as_deref().and_then(Shell::parse),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
pipeline:
  name: test
  jobs:
    - name: job-1
      steps:
        - name: step-1
          run: echo hello
"#;

    #[test]
    fn test_minimal_pipeline_parses() {
        let file = PipelineFile::from_yaml(MINIMAL).unwrap();
        let pipeline = file.into_pipeline().unwrap();
        assert_eq!(pipeline.meta.id, "pipeline.1");
        assert_eq!(pipeline.jobs.len(), 1);
        assert_eq!(pipeline.jobs[0].meta.id, "pipeline.1.job.1");
        assert_eq!(pipeline.jobs[0].steps[0].meta.id, "pipeline.1.job.1.step.1");
        assert_eq!(pipeline.jobs[0].steps[0].runs, vec!["echo hello"]);
    }

    #[test]
    fn test_declared_ids_flow_into_defaults() {
        let yaml = r#"
pipeline:
  name: test
  id: release
  jobs:
    - name: job-1
      steps:
        - name: step-1
          id: build
          run: make
"#;
        let pipeline = PipelineFile::from_yaml(yaml)
            .unwrap()
            .into_pipeline()
            .unwrap();
        assert_eq!(pipeline.meta.id, "release");
        assert_eq!(pipeline.jobs[0].meta.id, "release.job.1");
        assert_eq!(pipeline.jobs[0].steps[0].meta.id, "build");
    }

    #[test]
    fn test_scalar_values_normalized() {
        let yaml = r#"
pipeline:
  name: test
  enabled: true
  with:
    version: "1.2"
    flag: false
  env:
    COUNT: 3
  jobs:
    - name: job-1
      steps:
        - name: step-1
          run: echo
"#;
        let pipeline = PipelineFile::from_yaml(yaml)
            .unwrap()
            .into_pipeline()
            .unwrap();
        assert!(pipeline.meta.enabled);
        assert_eq!(pipeline.meta.properties.get("version").unwrap(), "1.2");
        assert_eq!(pipeline.meta.properties.get("flag").unwrap(), "false");
        assert_eq!(pipeline.meta.env.get("COUNT").unwrap(), "3");
    }

    #[test]
    fn test_enabled_word_vocabulary() {
        let yaml = MINIMAL.replace("name: test", "name: test\n  enabled: \"off\"");
        let pipeline = PipelineFile::from_yaml(&yaml)
            .unwrap()
            .into_pipeline()
            .unwrap();
        assert!(!pipeline.meta.enabled);
    }

    #[test]
    fn test_invalid_enabled_rejected() {
        let yaml = MINIMAL.replace("name: test", "name: test\n  enabled: \"sometimes\"");
        assert!(PipelineFile::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let yaml = r#"
pipeline:
  name: test
  id: x
  jobs:
    - name: job-1
      id: x
      steps:
        - name: step-1
          run: echo
"#;
        let err = PipelineFile::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_invalid_env_key_rejected() {
        let yaml = r#"
pipeline:
  name: test
  env:
    1BAD: value
  jobs:
    - name: job-1
      steps:
        - name: step-1
          run: echo
"#;
        assert!(PipelineFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_property_key_rejected() {
        let yaml = r#"
pipeline:
  name: test
  with:
    ".bad.": value
  jobs:
    - name: job-1
      steps:
        - name: step-1
          run: echo
"#;
        assert!(PipelineFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_blank_run_rejected() {
        let yaml = MINIMAL.replace("run: echo hello", "run: \"   \"");
        assert!(PipelineFile::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_unknown_shell_rejected() {
        let yaml = MINIMAL.replace("name: test", "name: test\n  shell: zsh");
        assert!(PipelineFile::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_unterminated_property_rejected() {
        let yaml = MINIMAL.replace("echo hello", "echo ${{ version");
        let err = PipelineFile::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("step-1"));
    }

    #[test]
    fn test_merge_run_lines_continuation() {
        let runs = merge_run_lines("echo a \\\n  b\necho c\n\n");
        assert_eq!(runs, vec!["echo a b", "echo c"]);
    }

    #[test]
    fn test_merge_run_lines_multiple_continuations() {
        let runs = merge_run_lines("cmd \\\n--flag \\\nvalue");
        assert_eq!(runs, vec!["cmd --flag value"]);
    }
}
