use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lantana_graph::GraphDef;
use lantana_pipeline::linearize;
use lantana_quota::{QuotaCoordinator, SqliteQuota};
use lantana_store::{SqliteStore, Store};

/// Lantana - pipeline orchestration with per-account quota settlement
#[derive(Parser)]
#[command(name = "lantana")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.lantana)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a workflow graph definition
  Validate {
    /// Path to the graph file (JSON)
    graph_file: PathBuf,
  },

  /// Derive the linear step list from a workflow graph
  Linearize {
    /// Path to the graph file (JSON)
    graph_file: PathBuf,
  },

  /// Inspect tasks
  Task {
    #[command(subcommand)]
    target: TaskTarget,
  },

  /// Inspect account quota
  Quota {
    #[command(subcommand)]
    target: QuotaTarget,
  },
}

#[derive(Subcommand)]
enum TaskTarget {
  /// Show a task, its steps, and its quota transaction
  Show { task_id: String },
}

#[derive(Subcommand)]
enum QuotaTarget {
  /// Show an account's balance and entitlement
  Show { account_id: String },
}

fn main() -> Result<()> {
  init_tracing();

  let cli = Cli::parse();

  let data_dir = cli.data_dir.unwrap_or_else(|| {
    dirs::home_dir()
      .expect("could not determine home directory")
      .join(".lantana")
  });

  match cli.command {
    Some(Commands::Validate { graph_file }) => validate(graph_file),
    Some(Commands::Linearize { graph_file }) => run_linearize(graph_file),
    Some(Commands::Task {
      target: TaskTarget::Show { task_id },
    }) => show_task(task_id, data_dir),
    Some(Commands::Quota {
      target: QuotaTarget::Show { account_id },
    }) => show_quota(account_id, data_dir),
    None => {
      println!("lantana - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  // Logs go to stderr; stdout carries command output.
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init();
}

fn load_graph(graph_file: &PathBuf) -> Result<GraphDef> {
  let content = std::fs::read_to_string(graph_file)
    .with_context(|| format!("failed to read graph file: {}", graph_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse graph file: {}", graph_file.display()))
}

fn validate(graph_file: PathBuf) -> Result<()> {
  let graph = load_graph(&graph_file)?;
  let report = graph.validate();

  println!("{}", serde_json::to_string_pretty(&report)?);

  if !report.valid {
    std::process::exit(1);
  }
  Ok(())
}

fn run_linearize(graph_file: PathBuf) -> Result<()> {
  let graph = load_graph(&graph_file)?;

  let report = graph.validate();
  if !report.valid {
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    anyhow::bail!("graph failed validation; fix the errors above");
  }

  let pipeline = linearize(&graph).context("failed to linearize graph")?;
  eprintln!("Derived {} steps", pipeline.len());
  println!("{}", serde_json::to_string_pretty(&pipeline)?);
  Ok(())
}

fn show_task(task_id: String, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let db = database_path(&data_dir)?;
    let store = SqliteStore::open(&db)
      .await
      .context("failed to open task store")?;
    let quota = SqliteQuota::open(&db)
      .await
      .context("failed to open quota ledger")?;

    let task = store.get_task(&task_id).await?;
    let steps = store.list_steps(&task_id).await?;
    let transaction = quota.get_transaction(&task_id).await?;

    let output = serde_json::json!({
      "task": task,
      "steps": steps,
      "quota_transaction": transaction,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
  })
}

fn show_quota(account_id: String, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let db = database_path(&data_dir)?;
    let quota = SqliteQuota::open(&db)
      .await
      .context("failed to open quota ledger")?;

    let account = quota.get_quota(&account_id).await?;
    println!("{}", serde_json::to_string_pretty(&account)?);
    Ok(())
  })
}

fn database_path(data_dir: &PathBuf) -> Result<PathBuf> {
  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  Ok(data_dir.join("lantana.db"))
}
