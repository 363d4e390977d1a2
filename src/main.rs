use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use githerd::config::AppConfig;
use githerd::gitcmd::GitCommandFactory;
use githerd::runner::progress::LogSink;
use githerd::runner::{BatchMode, BatchReport, BatchState, Orchestrator};
use githerd::shutdown::cancel_on_signal;
use githerd::task::types::TaskStatus;

#[derive(Parser)]
#[command(
    name = "githerd",
    about = "Concurrent pull/push runner for a directory full of git repositories"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Search roots (replaces the configured ones when given)
    #[arg(long)]
    root: Vec<PathBuf>,

    /// Repository names to exclude from the operation phase
    #[arg(long)]
    exclude: Vec<String>,

    /// Maximum concurrent git operations
    #[arg(short, long)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull every repository that is behind its upstream
    Pull,
    /// Commit and push every repository with uncommitted changes
    Push,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    let mode = match cli.command {
        Command::Pull => BatchMode::Pull,
        Command::Push => BatchMode::Push,
    };

    let mut batch = config.batch_config();
    if !cli.root.is_empty() {
        batch.roots = cli.root;
    }
    batch.excluded_repos.extend(cli.exclude);
    if let Some(jobs) = cli.jobs {
        batch.operation_concurrency = jobs;
    }

    tracing::info!(roots = ?batch.roots, mode = ?mode, "Starting batch");

    let factory = Arc::new(GitCommandFactory::new(config.push.commit_prefix.clone()));
    let mut orchestrator = Orchestrator::new(batch, factory, Arc::new(LogSink));

    // Ctrl+C / SIGTERM cancels the batch; outcomes are still drained.
    tokio::spawn(cancel_on_signal(orchestrator.cancellation_token()));

    let report = orchestrator.run(mode).await;
    print_report(&report);

    if report.state == BatchState::Cancelled {
        std::process::exit(130);
    }
    if report.operation.failed + report.operation.timed_out + report.discovery.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("Discovery:  {}", report.discovery);
    println!("Operations: {}", report.operation);

    for outcome in &report.outcomes {
        if matches!(outcome.status, TaskStatus::Failure | TaskStatus::TimedOut) {
            println!(
                "  {} [{}]: {}",
                outcome.target.name,
                outcome.kind.label(),
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if report.state == BatchState::Cancelled {
        println!("Batch cancelled; remaining work was skipped.");
    }
}
