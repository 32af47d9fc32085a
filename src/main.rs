//! issuetree - create hierarchical GitHub issues from a declarative batch
//!
//! Usage:
//!   issuetree create -i issues.json             → create (or resume) the batch
//!   issuetree create -i issues.json --dry-run   → show what would be created
//!   issuetree validate -i issues.json --tree    → structural checks only
//!   issuetree status [--run-id ID]              → progress of a run from the ledger
//!   issuetree list-runs                         → all runs, newest first
//!   issuetree cleanup --run-id ID --yes         → forget a run (issues stay on GitHub)
//!   issuetree init-config                       → write a default issuetree.toml

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use issuetree::config::{Config, DEFAULT_CONFIG_PATH};
use issuetree::logging;
use issuetree_core::{hash_file, BatchInput, IssueGraph, Run};
use issuetree_executor::{BatchRunner, RunFlags, RunnerOptions};
use issuetree_ledger::Ledger;
use issuetree_tracker::github::{resolve_token, GitHubTracker};
use issuetree_tracker::ResilientTracker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "issuetree",
    about = "Create hierarchical GitHub issues with resumable, idempotent runs",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overrides `log_level` from the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the issues described by an input file
    Create {
        /// JSON (or .yaml/.yml) batch file
        #[arg(short, long)]
        input: PathBuf,

        /// Validate and show what would be created, without side effects
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Run even if this input already completed; skip duplicate detection
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Continue a specific run
        #[arg(long)]
        resume: Option<String>,

        /// Print the run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check an input file without contacting GitHub
    Validate {
        #[arg(short, long)]
        input: PathBuf,

        /// Print the issue hierarchy
        #[arg(long, default_value_t = false)]
        tree: bool,
    },
    /// Show a run's progress (latest run by default)
    Status {
        #[arg(long)]
        run_id: Option<String>,
    },
    /// List all recorded runs
    ListRuns,
    /// Delete a run from the ledger. Issues already on GitHub are left alone.
    Cleanup {
        #[arg(long)]
        run_id: String,

        /// Confirm the deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(&cli.config);
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());

    let guard = match &cli.command {
        Commands::Create { .. } => {
            match logging::init_logging(&level, &config.log_directory, config.enable_color) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    logging::init_stderr(&level, config.enable_color);
                    tracing::warn!(dir = %config.log_directory.display(), error = %e, "file logging disabled");
                    None
                }
            }
        }
        _ => {
            logging::init_stderr(&level, config.enable_color);
            None
        }
    };

    let code = match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Create {
            input,
            dry_run,
            force,
            resume,
            json,
        } => {
            let flags = RunFlags {
                dry_run,
                force,
                resume,
            };
            create(&config, &input, &flags, json).await
        }
        Commands::Validate { input, tree } => validate(&input, tree),
        Commands::Status { run_id } => status(&config, run_id.as_deref()),
        Commands::ListRuns => list_runs(&config),
        Commands::Cleanup { run_id, yes } => cleanup(&config, &run_id, yes),
        Commands::InitConfig { force } => init_config(&cli.config, force),
    }
}

async fn create(config: &Config, path: &Path, flags: &RunFlags, json: bool) -> anyhow::Result<i32> {
    let input = BatchInput::from_path(path)?;
    let hash = hash_file(path).with_context(|| format!("hashing {}", path.display()))?;
    let ledger = Ledger::open(&config.state_db_path)?;

    // Dry runs never reach the tracker.
    let token = if flags.dry_run {
        String::new()
    } else {
        resolve_token().await?
    };
    let github = GitHubTracker::new(&input.repository, token)?.with_base_url(&config.github.api_url);
    let tracker = ResilientTracker::new(Arc::new(github), config.retry_policy());
    let runner = BatchRunner::new(
        ledger,
        tracker,
        RunnerOptions {
            create_missing_labels: config.github.create_missing_labels,
        },
    );

    info!(input = %path.display(), repository = %input.repository, "starting batch");
    let report = runner
        .run_input(&input, &path.display().to_string(), &hash, flags)
        .await?;

    if json {
        println!("{}", report.to_json());
    } else {
        let mark = if report.success { "✓" } else { "✗" };
        println!("{} {}", mark, report.summary_line());
        for id in &report.failed_ids {
            println!("  failed: {}", id);
        }
        if !report.success {
            println!("  resume with: issuetree create -i {} --resume {}", path.display(), report.run_id);
        }
    }
    Ok(if report.success { 0 } else { 1 })
}

fn validate(path: &Path, tree: bool) -> anyhow::Result<i32> {
    let input = BatchInput::from_path(path)?;
    let graph = input.build_graph()?;
    let order = graph.topological_sort()?;
    let max_depth = order.iter().map(|id| graph.depth(id)).max().unwrap_or(0);

    println!("✓ {} is valid", path.display());
    println!("  repository: {}", input.repository);
    println!("  issues:     {}", graph.len());
    println!("  roots:      {}", input.root_count());
    println!("  max depth:  {}", max_depth);

    if tree {
        print_tree(&graph);
    }
    Ok(0)
}

fn print_tree(graph: &IssueGraph) {
    for root in graph.roots() {
        let mut ids = vec![root.clone()];
        ids.extend(graph.all_descendants(root));
        for id in ids {
            if let Some(item) = graph.get(&id) {
                let indent = "  ".repeat(graph.depth(&id) + 1);
                println!("{}{}: {}", indent, id, item.title);
            }
        }
    }
}

/// Read-only commands should not create an empty ledger as a side effect.
fn open_existing(config: &Config) -> anyhow::Result<Ledger> {
    if !config.state_db_path.exists() {
        bail!("no ledger at {}", config.state_db_path.display());
    }
    Ok(Ledger::open(&config.state_db_path)?)
}

fn status(config: &Config, run_id: Option<&str>) -> anyhow::Result<i32> {
    let ledger = open_existing(config)?;
    let run = match run_id {
        Some(id) => ledger
            .get_run(id)?
            .ok_or_else(|| anyhow!("run not found: {}", id))?,
        None => ledger
            .list_runs()?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no runs recorded"))?,
    };
    let stats = ledger.get_run_stats(&run.run_id)?;

    println!("Run {}", run.run_id);
    println!("  repository: {}", run.repository);
    println!("  input:      {} ({})", run.input_file, &run.input_file_hash[..run.input_file_hash.len().min(12)]);
    println!("  status:     {}", run.status);
    println!("  started:    {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(done) = run.completed_at {
        println!("  completed:  {}", done.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  issues:     {} ({} linked, {} unlinked)", stats.total, stats.linked, stats.unlinked);

    for item in ledger.created_items_for_run(&run.run_id)? {
        let link = match (&item.parent_id, item.parent_external_number) {
            (None, _) => "root".to_string(),
            (Some(_), Some(parent)) if item.is_linked() => format!("under #{}", parent),
            (Some(parent), _) => format!("not linked to {}", parent),
        };
        println!("  #{:<6} {:<16} {} [{}]", item.external_number, item.local_id, item.title, link);
    }
    Ok(0)
}

fn list_runs(config: &Config) -> anyhow::Result<i32> {
    let ledger = open_existing(config)?;
    let runs = ledger.list_runs()?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(0);
    }
    println!("{:<26} {:<28} {:<12} {:<20} {:>6}", "RUN ID", "REPOSITORY", "STATUS", "STARTED", "ISSUES");
    for run in &runs {
        print_run_row(&ledger, run)?;
    }
    Ok(0)
}

fn print_run_row(ledger: &Ledger, run: &Run) -> anyhow::Result<()> {
    let stats = ledger.get_run_stats(&run.run_id)?;
    println!(
        "{:<26} {:<28} {:<12} {:<20} {:>6}",
        run.run_id,
        run.repository,
        run.status.as_str(),
        run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        stats.total
    );
    Ok(())
}

fn cleanup(config: &Config, run_id: &str, yes: bool) -> anyhow::Result<i32> {
    let ledger = open_existing(config)?;
    if ledger.get_run(run_id)?.is_none() {
        bail!("run not found: {}", run_id);
    }
    if !yes {
        bail!("refusing to delete run {} without --yes (this cannot be undone)", run_id);
    }
    let stats = ledger.get_run_stats(run_id)?;
    ledger.delete_run(run_id)?;
    println!("✓ run {} deleted from the ledger ({} issue records)", run_id, stats.total);
    println!("  issues on GitHub were not touched");
    Ok(0)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, Config::default().to_toml())
        .with_context(|| format!("writing {}", path.display()))?;
    println!("✓ wrote {}", path.display());
    Ok(0)
}
