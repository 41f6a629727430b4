mod args;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

use dahlia_config::{SourceDef, WorkflowDef};
use dahlia_engine::{
  ArtifactSelector, Execution, ExecutionStatus, ExecutionSummary, Executor, NewExecution,
  RetryOptions, StepStatus,
};
use dahlia_runtime::{ExternalRuntime, RuntimeRegistry};
use dahlia_storage::Storage;
use dahlia_tool::HttpToolConnector;

use crate::config::DahliaConfig;

/// Dahlia - durable workflows over remote tool services
#[derive(Parser)]
#[command(name = "dahlia")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.dahlia)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create an execution of a workflow and run it
  Run {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,

    /// Execution name (default: a random id)
    #[arg(long)]
    name: Option<String>,

    /// Workflow argument; `@path` passes a file or directory
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Use a worker of another execution as a source
    #[arg(long = "source", value_name = "NAME=EXECUTION:WORKER[@EXECUTOR]")]
    sources: Vec<String>,

    /// Directory of files readable as workflow context
    #[arg(long)]
    context: Option<PathBuf>,

    /// Environment variable readable by the workflow
    #[arg(short, long = "env", value_name = "NAME=VALUE")]
    env: Vec<String>,

    /// Runtime to create the application on
    #[arg(long)]
    runtime: Option<Url>,

    /// Download an output into a directory once the run stops
    #[arg(long = "save", value_name = "OUTPUT=DIR")]
    save: Vec<String>,
  },

  /// Continue a suspended or interrupted execution
  Resume { execution: String },

  /// Restart a failed execution
  Retry {
    execution: String,

    /// Index of the first step to run again (default: the failed step)
    #[arg(long)]
    step: Option<usize>,

    /// Replacement workflow whose steps from the restart index are used
    #[arg(long)]
    workflow: Option<PathBuf>,

    /// Worker to provision again before restarting
    #[arg(long = "recreate-worker", value_name = "NAME")]
    recreate_workers: Vec<String>,

    /// Directory replacing the workflow context
    #[arg(long)]
    context: Option<PathBuf>,
  },

  /// Delete executions and their applications
  Rm {
    #[arg(required = true)]
    executions: Vec<String>,
  },

  /// List executions
  Ps {
    /// Only print names
    #[arg(short, long)]
    quiet: bool,
  },

  /// Show the durable state of an execution
  Status {
    execution: String,

    #[arg(long)]
    json: bool,
  },

  /// Print the log of a step's last command
  StepLog {
    execution: String,

    /// Step name or index
    step: String,
  },

  /// Download an artifact's data into a directory
  Save {
    execution: String,

    /// Directory to extract into
    dir: PathBuf,

    /// The artifact assigned to this output
    #[arg(long)]
    output: Option<String>,

    /// The artifact produced by this step (name or index)
    #[arg(long)]
    step: Option<String>,

    /// A worker's artifact, addressed as WORKER:ARTIFACT
    #[arg(long, value_name = "WORKER:ARTIFACT")]
    artifact: Option<String>,
  },

  /// Ask the running step's command to stop
  Interrupt { execution: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".dahlia"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { dispatch(cli.command, &data_dir).await })
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

/// Executor and settings for one data directory.
struct App {
  executor: Executor,
  config: DahliaConfig,
}

impl App {
  fn open(data_dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(data_dir)
      .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let config = DahliaConfig::load(data_dir)?;

    let mut runtimes = RuntimeRegistry::new();
    runtimes.register(
      "external",
      Arc::new(ExternalRuntime::new(
        Storage::filesystem(data_dir.join("runtime")),
        config.endpoints.clone(),
      )),
    );

    let executor = Executor::new(
      Storage::filesystem(data_dir.join("executions")),
      runtimes,
      Arc::new(HttpToolConnector::new()),
    )
    .with_config(config.engine_config());

    Ok(Self { executor, config })
  }

  async fn execution(&self, name: &str) -> Result<Execution> {
    self
      .executor
      .execution(name)
      .await
      .with_context(|| format!("failed to open execution {}", name))
  }
}

async fn dispatch(command: Commands, data_dir: &Path) -> Result<()> {
  let app = App::open(data_dir)?;

  match command {
    Commands::Run {
      workflow_file,
      name,
      params,
      sources,
      context,
      env,
      runtime,
      save,
    } => {
      let workflow = WorkflowDef::load(&workflow_file)
        .with_context(|| format!("failed to load workflow file: {}", workflow_file.display()))?;
      let name = name.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

      let config = app
        .config
        .execution_config(runtime, args::parse_environment(&env)?)?;
      let mut request = NewExecution::new(name.clone(), workflow, config);
      request.arguments = args::parse_arguments(&params)?;
      for raw in &sources {
        let (source, reference) = args::parse_key_value(raw)?;
        let reference: SourceDef = reference
          .parse()
          .with_context(|| format!("invalid source {}", source))?;
        request.sources.insert(source, reference);
      }
      if let Some(dir) = &context {
        request.context = args::read_context(dir).await?;
      }
      let saves = save
        .iter()
        .map(|raw| args::parse_key_value(raw))
        .collect::<Result<Vec<_>>>()?;

      let execution = app
        .executor
        .create_execution(request)
        .await
        .context("failed to create execution")?;
      eprintln!("Created execution: {}", name);

      let status = execution.execute().await.context("execution failed")?;
      for (output, dir) in &saves {
        save_output(&execution, output, Path::new(dir)).await;
      }
      finish(&execution, status).await
    }

    Commands::Resume { execution } => {
      let execution = app.execution(&execution).await?;
      let status = execution.execute().await.context("execution failed")?;
      finish(&execution, status).await
    }

    Commands::Retry {
      execution,
      step,
      workflow,
      recreate_workers,
      context,
    } => {
      let execution = app.execution(&execution).await?;
      let mut options = RetryOptions {
        step,
        recreate_workers,
        ..RetryOptions::default()
      };
      if let Some(path) = &workflow {
        options.workflow = Some(
          WorkflowDef::load(path)
            .with_context(|| format!("failed to load workflow file: {}", path.display()))?,
        );
      }
      if let Some(dir) = &context {
        options.context = Some(args::read_context(dir).await?);
      }

      let status = execution.retry(options).await.context("retry failed")?;
      finish(&execution, status).await
    }

    Commands::Rm { executions } => {
      for name in &executions {
        app
          .executor
          .delete_execution(name)
          .await
          .with_context(|| format!("failed to delete execution {}", name))?;
        println!("{}", name);
      }
      Ok(())
    }

    Commands::Ps { quiet } => {
      for name in app.executor.names().await? {
        if quiet {
          println!("{}", name);
          continue;
        }
        let execution = app.execution(&name).await?;
        // A creation that never finished has no status; `rm` removes it.
        let (status, created_at) = match (execution.status().await, execution.created_at().await) {
          (Ok(status), Ok(created_at)) => (
            status.to_string(),
            created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
          ),
          _ => ("incomplete".to_string(), String::new()),
        };
        println!("{:<38} {:<12} {}", name, status, created_at);
      }
      Ok(())
    }

    Commands::Status { execution, json } => {
      let summary = app.execution(&execution).await?.summary().await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
      } else {
        print_summary(&summary);
      }
      Ok(())
    }

    Commands::StepLog { execution, step } => {
      let log = app
        .execution(&execution)
        .await?
        .step_log(&step)
        .await
        .with_context(|| format!("failed to fetch log of step {}", step))?;
      print!("{}", log);
      Ok(())
    }

    Commands::Save {
      execution,
      dir,
      output,
      step,
      artifact,
    } => {
      let selector = match (output, step, artifact) {
        (Some(output), None, None) => ArtifactSelector::Output(output),
        (None, Some(step), None) => ArtifactSelector::Step(step),
        (None, None, Some(raw)) => match raw.split_once(':') {
          Some((worker, artifact)) if !worker.is_empty() && !artifact.is_empty() => {
            ArtifactSelector::Worker {
              worker: worker.to_string(),
              artifact: artifact.to_string(),
            }
          }
          _ => bail!("expected WORKER:ARTIFACT, got {:?}", raw),
        },
        _ => bail!("give exactly one of --output, --step or --artifact"),
      };
      app
        .execution(&execution)
        .await?
        .save_artifact(&selector, &dir)
        .await
        .with_context(|| format!("failed to save into {}", dir.display()))?;
      eprintln!("Saved to {}", dir.display());
      Ok(())
    }

    Commands::Interrupt { execution } => {
      app.execution(&execution).await?.request_interrupt().await?;
      eprintln!("Interrupt requested for {}", execution);
      Ok(())
    }
  }
}

async fn save_output(execution: &Execution, output: &str, dir: &Path) {
  let selector = ArtifactSelector::Output(output.to_string());
  match execution.save_artifact(&selector, dir).await {
    Ok(()) => eprintln!("Saved output {} to {}", output, dir.display()),
    Err(e) => warn!(execution = %execution.name(), %output, error = %e, "save_failed"),
  }
}

/// Report how a run stopped. A failed execution prints the failed step's
/// log and becomes an error.
async fn finish(execution: &Execution, status: ExecutionStatus) -> Result<()> {
  match status {
    ExecutionStatus::Completed => {
      eprintln!("Execution {} completed", execution.name());
      Ok(())
    }
    ExecutionStatus::Suspended => {
      eprintln!(
        "Execution {} is waiting; run `dahlia resume {}` to continue",
        execution.name(),
        execution.name()
      );
      Ok(())
    }
    ExecutionStatus::Failed => {
      let summary = execution.summary().await?;
      if let Some(step) = summary
        .steps
        .iter()
        .find(|step| step.status == StepStatus::Failed)
      {
        if let Some(error) = &step.error {
          eprintln!("Step {} failed: {}", step.index, error);
        }
        match execution.step_log(&step.index.to_string()).await {
          Ok(log) => eprint!("{}", log),
          Err(e) => warn!(execution = %execution.name(), step = step.index, error = %e, "log_unavailable"),
        }
      }
      bail!("execution {} failed", execution.name())
    }
    other => {
      eprintln!("Execution {} is {}", execution.name(), other);
      Ok(())
    }
  }
}

fn print_summary(summary: &ExecutionSummary) {
  println!("Execution: {}", summary.name);
  println!("Status:    {}", summary.status);
  println!("Created:   {}", summary.created_at.format("%Y-%m-%d %H:%M:%S"));
  if let Some(step) = summary.current_step {
    println!("Current:   step {}", step);
  }

  println!();
  println!("{:<6} {:<20} {:<12} {:<16} ARTIFACT", "STEP", "NAME", "STATUS", "WORKER");
  for step in &summary.steps {
    let worker = if step.wait { "(wait)" } else { step.worker.as_deref().unwrap_or("-") };
    println!(
      "{:<6} {:<20} {:<12} {:<16} {}",
      step.index,
      step.name.as_deref().unwrap_or("-"),
      step.status,
      worker,
      step.artifact.as_deref().unwrap_or("-"),
    );
  }

  if !summary.workers.is_empty() || !summary.sources.is_empty() {
    println!();
    println!("{:<20} {:<10} URL", "INSTANCE", "STATUS");
    for instance in summary.workers.iter().chain(&summary.sources) {
      println!(
        "{:<20} {:<10} {}",
        instance.name,
        instance.status,
        instance.url.as_ref().map(Url::as_str).unwrap_or("-"),
      );
    }
  }

  if !summary.outputs.is_empty() {
    println!();
    println!("{:<20} {:<10} {:<24} ARTIFACT", "OUTPUT", "STATUS", "LABEL");
    for output in &summary.outputs {
      let artifact = match (&output.worker, &output.artifact) {
        (Some(worker), Some(artifact)) => format!("{}:{}", worker, artifact),
        _ => "-".to_string(),
      };
      println!(
        "{:<20} {:<10} {:<24} {}",
        output.name, output.status, output.label, artifact
      );
    }
  }
}
