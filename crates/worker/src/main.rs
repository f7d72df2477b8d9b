use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelwatch_catalog::models::available_models;
use modelwatch_catalog::selection::format_summary;
use modelwatch_catalog::{CatalogApi, ModelCatalog};
use modelwatch_core::config::MonitorConfig;
use modelwatch_core::scripting::notebook::{collect_passthrough_env, NotebookExecutor};
use modelwatch_store::feed::StatusFeed;
use modelwatch_store::history::HistoryStore;
use modelwatch_store::identity;
use modelwatch_store::model_status::ModelStatusStore;
use modelwatch_worker::orchestrator::{MonitorRunner, RunMode, RunOptions};
use modelwatch_worker::publish::{self, GitSync};
use modelwatch_worker::report;

/// modelwatch: end-to-end health checks for a hosted model-inference service.
#[derive(Debug, Parser)]
#[command(name = "modelwatch", version, about, long_about = None)]
struct Cli {
    /// Override `MONITOR_RESULTS_DIR`.
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Override `MONITOR_SCENARIOS_DIR`.
    #[arg(long, global = true)]
    scenarios_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Test the selected models and record the outcomes.
    Run(RunArgs),

    /// Show catalog availability without running tests.
    Catalog,

    /// Show every tracked model status from previous runs.
    Status,

    /// Regenerate the status feed from existing history.
    Dashboard(DashboardArgs),

    /// Drop history entries older than the retention window.
    Prune(PruneArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Test one model per run, cycling through the selection.
    #[arg(long)]
    cycle: bool,

    /// Extra hot models tested per architecture.
    #[arg(long)]
    max_models: Option<usize>,

    /// Regenerate the status feed after the run.
    #[arg(long)]
    dashboard: bool,

    /// Deploy the feed and model records to this directory (implies --dashboard).
    #[arg(long, value_name = "PATH")]
    deploy: Option<PathBuf>,

    /// Commit and push the results directory afterwards.
    #[arg(long)]
    sync: bool,

    /// Skip the run log (model records are always written).
    #[arg(long)]
    no_save: bool,

    /// Run log file name.
    #[arg(long)]
    output: Option<String>,
}

#[derive(Debug, Args)]
struct DashboardArgs {
    /// Deploy the feed and model records to this directory.
    #[arg(long, value_name = "PATH")]
    deploy: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PruneArgs {
    /// Days of history to keep (default `MONITOR_HISTORY_DAYS`).
    #[arg(long)]
    keep_days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = MonitorConfig::from_env().context("invalid monitor configuration")?;
    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }
    if let Some(dir) = cli.scenarios_dir {
        config.scenarios_dir = dir;
    }

    match cli.command {
        Command::Run(args) => {
            if !run(&config, args).await? {
                std::process::exit(1);
            }
        }
        Command::Catalog => {
            let snapshot = CatalogApi::new(config.catalog_url.clone())
                .fetch_status()
                .await
                .context("failed to fetch catalog status")?;
            print!("{}", format_summary(&available_models(&snapshot, false)));
        }
        Command::Status => {
            let statuses = ModelStatusStore::new(&config.results_dir)
                .list()
                .context("failed to read model status records")?;
            print!("{}", report::format_tracked_statuses(&statuses, Utc::now()));
        }
        Command::Dashboard(args) => {
            let path = write_feed(&config)?;
            println!("Status feed written: {}", path.display());
            if let Some(target) = args.deploy {
                deploy_to(&config.results_dir, &target);
            }
        }
        Command::Prune(args) => {
            let keep_days = args.keep_days.unwrap_or(config.history_days);
            let removed = HistoryStore::from_config(&config)
                .prune(keep_days)
                .context("failed to prune history")?;
            println!("Removed {removed} history entries older than {keep_days} days");
        }
    }

    Ok(())
}

/// Execute a monitoring run. Returns `false` when any scenario ended
/// `FAILED` or `UNAVAILABLE`.
async fn run(config: &MonitorConfig, args: RunArgs) -> Result<bool> {
    let env = collect_passthrough_env(&config.passthrough_env);
    for key in &config.passthrough_env {
        if !env.iter().any(|(k, _)| k == key) {
            tracing::warn!(variable = %key, "Pass-through variable not set, tests may fail");
        }
    }

    let runner = MonitorRunner::new(
        config,
        NotebookExecutor::from_config(config),
        CatalogApi::new(config.catalog_url.clone()),
    );
    let options = RunOptions {
        mode: if args.cycle {
            RunMode::Cycle
        } else {
            RunMode::Full
        },
        max_per_architecture: args.max_models.unwrap_or(config.max_per_architecture),
        env,
    };

    let run = runner.run(&options).await.context("monitoring run aborted")?;
    print!("{}", report::format_run_summary(&run));

    if !args.no_save {
        match runner.save_result(&run, args.output.as_deref()) {
            Ok(path) => println!("Run log saved to: {}", path.display()),
            Err(e) => tracing::error!(error = %e, "Failed to save run log"),
        }
    }

    if args.dashboard || args.deploy.is_some() {
        write_feed(config)?;
        if let Some(target) = &args.deploy {
            deploy_to(&config.results_dir, target);
        }
    }

    if args.sync {
        let message = format!(
            "Update monitor results from {}\n\n{} tests, client {}",
            identity::hostname(),
            run.tests.len(),
            run.service_version,
        );
        if let Err(e) = GitSync::new(&config.results_dir)
            .push(&[PathBuf::from(".")], &message)
            .await
        {
            tracing::warn!(error = %e, "Results sync failed");
        }
    }

    Ok(!run.has_failures())
}

fn write_feed(config: &MonitorConfig) -> Result<PathBuf> {
    let feed = StatusFeed::build(
        &HistoryStore::from_config(config),
        &ModelStatusStore::new(&config.results_dir),
        config.history_days,
        Utc::now(),
    )
    .context("failed to build status feed")?;

    let path = config.feed_path();
    feed.write(&path).context("failed to write status feed")?;
    Ok(path)
}

fn deploy_to(results_dir: &Path, target: &Path) {
    match publish::deploy(results_dir, target) {
        Ok(report) => println!(
            "Deployed to {}: feed={} models={}",
            target.display(),
            report.feed,
            report.models
        ),
        Err(e) => tracing::warn!(error = %e, "Deploy failed"),
    }
}
