//! Directive run lines handled by the engine itself

mod helpers;

use helpers::{failing_output, run_yaml, MockRunner};
use pipewright::engine::directive::{checksum_file, ChecksumAlgorithm};
use pipewright::engine::{EngineOptions, ExecutionEngine};
use pipewright::NodeStatus;
use std::fs;

#[tokio::test]
async fn test_print_directives_do_not_spawn_processes() {
    let yaml = r#"
pipeline:
  name: print
  with:
    version: 9.9
  jobs:
    - name: job
      steps:
        - name: step
          run: |
            --print:info starting ${{ version }}
            --print:error something to stderr
"#;
    let runner = MockRunner::passing();
    let report = run_yaml(yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 0);
    assert!(runner.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_directive_fails_the_step() {
    let yaml = r#"
pipeline:
  name: bad-directive
  jobs:
    - name: job
      steps:
        - name: step
          run: --frobnicate now
"#;
    let runner = MockRunner::passing();
    let report = run_yaml(yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 1);
    assert_eq!(report.jobs[0].steps[0].status, NodeStatus::Failed);
    assert!(runner.requests().is_empty());
}

#[tokio::test]
async fn test_checksum_directive_passes_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifact.bin");
    fs::write(&path, b"artifact contents").unwrap();
    let digest = checksum_file(&path, ChecksumAlgorithm::Sha256).unwrap();

    let yaml = format!(
        r#"
pipeline:
  name: checksum
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: good
          run: --sha-checksum artifact.bin {digest}
"#,
        dir = dir.path().display(),
    );
    let report = run_yaml(&yaml, MockRunner::passing()).await;
    assert_eq!(report.exit_code, 0);

    let wrong = "0".repeat(64);
    let yaml = yaml.replace(&digest, &wrong);
    let report = run_yaml(&yaml, MockRunner::passing()).await;
    assert_eq!(report.exit_code, 1);
    assert_eq!(report.jobs[0].steps[0].status, NodeStatus::Failed);
}

#[tokio::test]
async fn test_checksum_with_unknown_digest_length_fails() {
    let yaml = r#"
pipeline:
  name: checksum-bad
  jobs:
    - name: job
      steps:
        - name: step
          run: --sha-checksum file.bin abc
"#;
    let report = run_yaml(yaml, MockRunner::passing()).await;
    assert_eq!(report.exit_code, 1);
}

#[tokio::test]
async fn test_extension_extracts_then_runs() {
    let yaml = r#"
pipeline:
  name: extension
  jobs:
    - name: job
      steps:
        - name: step
          run: --extension tooling.tar.gz
"#;
    let runner = MockRunner::passing();
    let report = run_yaml(yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 0);
    let commands = runner.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with("tar -xzf"));
    assert!(commands[0].contains("tooling.tar.gz"));
    assert_eq!(commands[1], "./run.sh");
    // run.sh executes inside the scratch directory, not the step directory
    let requests = runner.requests();
    assert_ne!(requests[0].working_directory, requests[1].working_directory);
}

#[tokio::test]
async fn test_extension_failure_propagates() {
    let yaml = r#"
pipeline:
  name: extension-fail
  jobs:
    - name: job
      steps:
        - name: step
          run: --extension tooling.zip
"#;
    // Extraction succeeds, run.sh fails
    let runner = MockRunner::scripted(vec![helpers::passing_output(&[]), failing_output(5)]);
    let report = run_yaml(yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 5);
}

#[tokio::test]
async fn test_nested_pipeline_directive() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("child.yaml"),
        r#"
pipeline:
  name: child
  jobs:
    - name: job
      steps:
        - name: step
          run: echo from-child
"#,
    )
    .unwrap();

    let yaml = format!(
        r#"
pipeline:
  name: parent
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: nest
          run: --pipeline child.yaml
        - name: after
          run: echo after-child
"#,
        dir = dir.path().display(),
    );
    let runner = MockRunner::passing();
    let report = run_yaml(&yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 0);
    assert_eq!(runner.commands(), vec!["echo from-child", "echo after-child"]);
}

#[tokio::test]
async fn test_nested_pipelines_recurse_two_levels() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("leaf.yaml"),
        r#"
pipeline:
  name: leaf
  jobs:
    - name: job
      steps:
        - name: step
          run: echo from-leaf
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("middle.yaml"),
        format!(
            r#"
pipeline:
  name: middle
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: nest
          run: --pipeline leaf.yaml
"#,
            dir = dir.path().display(),
        ),
    )
    .unwrap();

    let yaml = format!(
        r#"
pipeline:
  name: root
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: nest
          run: --pipeline middle.yaml
"#,
        dir = dir.path().display(),
    );
    let runner = MockRunner::passing();
    let report = run_yaml(&yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 0);
    assert_eq!(runner.commands(), vec!["echo from-leaf"]);
}

#[tokio::test]
async fn test_nested_pipeline_failure_fails_the_step() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("child.yaml"),
        r#"
pipeline:
  name: child
  jobs:
    - name: job
      steps:
        - name: step
          run: exit 4
"#,
    )
    .unwrap();

    let yaml = format!(
        r#"
pipeline:
  name: parent
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: nest
          run: --pipeline child.yaml
"#,
        dir = dir.path().display(),
    );
    let runner = MockRunner::scripted(vec![failing_output(4)]);
    let report = run_yaml(&yaml, runner.clone()).await;

    assert_eq!(report.exit_code, 4);
    assert_eq!(report.jobs[0].steps[0].status, NodeStatus::Failed);
}

#[tokio::test]
async fn test_missing_nested_pipeline_fails() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
pipeline:
  name: parent
  working-directory: {dir}
  jobs:
    - name: job
      steps:
        - name: nest
          run: --pipeline does-not-exist.yaml
"#,
        dir = dir.path().display(),
    );
    let report = run_yaml(&yaml, MockRunner::passing()).await;
    assert_eq!(report.exit_code, 1);
}

#[tokio::test]
async fn test_execute_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.yaml");
    fs::write(
        &path,
        r#"
pipeline:
  name: from-file
  jobs:
    - name: job
      steps:
        - name: step
          run: echo loaded
"#,
    )
    .unwrap();

    let runner = MockRunner::passing();
    let engine = ExecutionEngine::new(runner.clone(), EngineOptions::default());
    let report = engine.execute_file(&path).await.unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(runner.commands(), vec!["echo loaded"]);
}
