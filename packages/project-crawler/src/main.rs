//! project-crawler command line.

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use project_crawler::{
    collect, read_seeds, CheckpointStore, CrawlOrchestrator, CsvCheckpointStore, HttpAssetFetcher,
    HttpRenderer, OutputLayout, RendererExt, RunMode, SessionState, TaskStatus,
};

#[derive(Parser)]
#[command(name = "project-crawler", version, about = "Resumable architecture-project crawler")]
struct Cli {
    /// Task list CSV (checkpoint store)
    #[arg(long, global = true)]
    task_list: Option<PathBuf>,

    /// Root directory for per-project output
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Session bundle JSON with cookies and headers
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl every actionable task in the task list
    Run {
        /// full or text-only
        #[arg(long)]
        mode: Option<RunMode>,

        /// Process one task without touching the task list
        #[arg(long)]
        debug: bool,
    },
    /// Merge discovered projects into the task list
    Seed {
        /// Discovery CSV (id/project_id, url/link, title, category/keyword)
        file: PathBuf,
    },
    /// Print task counts per status
    Status,
    /// Merge image sidecars into details documents and gather them
    Collect {
        /// Collection directory
        #[arg(long, default_value = "jsons")]
        into: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_crawler=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    let mut config = settings::from_env().context("Failed to load configuration")?;
    if let Some(path) = cli.task_list {
        config = config.with_task_list(path);
    }
    if let Some(path) = cli.output_dir {
        config = config.with_output_dir(path);
    }
    if let Some(path) = cli.session {
        config = config.with_session_file(path);
    }

    let store = CsvCheckpointStore::new(&config.task_list);

    match cli.command {
        Command::Run { mode, debug } => {
            if let Some(mode) = mode {
                config = config.with_mode(mode);
            }
            config = config.with_debug(debug);

            let session = match &config.session_file {
                Some(path) => SessionState::load(path)
                    .await
                    .with_context(|| format!("Failed to load session from {}", path.display()))?,
                None => SessionState::new(),
            };
            info!(
                cookies = ?session.cookie_names().collect::<Vec<_>>(),
                "Session state loaded"
            );

            let renderer = HttpRenderer::new(&config)
                .context("Failed to build HTTP renderer")?
                .rate_limited(config.requests_per_second);
            let fetcher = HttpAssetFetcher::new(&config).context("Failed to build asset fetcher")?;

            let token = CancellationToken::new();
            let interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current commit");
                    interrupt.cancel();
                }
            });

            let summary = CrawlOrchestrator::new(renderer, store, fetcher, session, config)
                .with_cancellation(token)
                .run()
                .await
                .context("Crawl run failed")?;

            println!(
                "{} run: {} selected, {} processed ({} downloaded, {} incomplete, {} error){}",
                summary.mode,
                summary.selected,
                summary.processed,
                summary.downloaded,
                summary.incomplete,
                summary.errored,
                if summary.cancelled { ", cancelled" } else { "" }
            );
        }
        Command::Seed { file } => {
            let import = read_seeds(&file)
                .await
                .with_context(|| format!("Failed to read seeds from {}", file.display()))?;
            let report = store
                .seed(&import.seeds)
                .await
                .with_context(|| format!("Failed to seed {}", config.task_list.display()))?;

            println!(
                "Seeded {}: {} added, {} already present, {} excluded, {} invalid",
                config.task_list.display(),
                report.added,
                report.skipped,
                import.excluded,
                import.invalid
            );
        }
        Command::Status => {
            let records = store
                .load()
                .await
                .with_context(|| format!("Failed to load {}", config.task_list.display()))?;

            println!("{} ({} tasks)", config.task_list.display(), records.len());
            for status in TaskStatus::ALL {
                let count = records.iter().filter(|r| r.status == status).count();
                println!("  {:<11} {}", status.as_str(), count);
            }
        }
        Command::Collect { into } => {
            let report = collect(&OutputLayout::new(&config.output_dir), &into)
                .await
                .context("Collect failed")?;

            println!(
                "Collected {} of {} into {} ({} with images, {} without, {} skipped, {} failed)",
                report.collected(),
                report.total,
                into.display(),
                report.merged,
                report.without_images,
                report.skipped,
                report.failed
            );
        }
    }

    Ok(())
}
