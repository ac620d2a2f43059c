use anyhow::{Context, Result};
use pipewright::cli::commands::{RunCommand, ValidateCommand};
use pipewright::cli::output::{style, CHECK, CROSS, INFO};
use pipewright::cli::{Cli, Command};
use pipewright::core::PipelineFile;
use pipewright::engine::{EngineOptions, ExecutionEngine, ResolvePolicy, ShellRunner};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let overrides: BTreeMap<String, String> = cmd.with.iter().cloned().collect();
    let options = EngineOptions {
        timestamps: cmd.timestamps,
        policy: if cmd.strict {
            ResolvePolicy::Strict
        } else {
            ResolvePolicy::PassThrough
        },
        overrides,
    };

    let engine = ExecutionEngine::new(ShellRunner, options);
    let report = engine
        .execute_file(Path::new(&cmd.file))
        .await
        .context("Failed to load pipeline")?;

    // The binary's exit status is the pipeline's exit code
    if report.exit_code != 0 {
        std::process::exit(report.exit_code);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineFile::from_file(&cmd.file) {
        Ok(file) => {
            let steps: usize = file.pipeline.jobs.iter().map(|j| j.steps.len()).sum();
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&file.pipeline.name).bold());
            println!("  Jobs: {}", style(file.pipeline.jobs.len()).cyan());
            println!("  Steps: {}", style(steps).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&file)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}
