//! Track acquirer command line.
//!
//! Queues acquisition targets, runs the worker pool against the external
//! catalog, and inspects tasks and the review queue.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    AcquisitionTask, CandidateVideo, Config, TargetRequest, TargetTrack, TaskQueue, TaskStatus,
    TaskStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use track_acquirer::{Scheduler, SqliteReviewQueue, TaskRun, YtDlpSearchProvider};
use track_matcher::MatchPolicy;

#[derive(Parser, Debug)]
#[command(name = "track-acquirer", author, version)]
#[command(about = "Acquire tracks from an external video catalog")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue one target track for acquisition
    Enqueue {
        /// Track name
        #[arg(long)]
        name: String,

        /// Artist name; repeat for collaborators, primary artist first
        #[arg(long = "artist", required = true)]
        artists: Vec<String>,

        /// Track length in seconds
        #[arg(long, allow_hyphen_values = true)]
        length: i64,
    },

    /// Queue targets from a JSON array of {name, artists, length_seconds}
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Run acquisition workers
    Run {
        /// Number of concurrent workers (defaults to acquisition.max_concurrent_tasks)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Keep polling for new tasks until interrupted
        #[arg(long)]
        watch: bool,

        /// Run only this task
        #[arg(long, conflicts_with = "watch")]
        task: Option<i64>,
    },

    /// Show queue statistics, one task, or tasks with a given status
    Status {
        /// Task id
        #[arg(long)]
        id: Option<i64>,

        /// pending, running, complete or failed
        #[arg(long, conflicts_with = "id")]
        status: Option<TaskStatus>,
    },

    /// Request cancellation of a pending or running task
    Cancel {
        /// Task id
        id: i64,
    },

    /// List matches awaiting review
    Review,

    /// Evaluate one candidate against a target without touching the queue
    Check {
        #[arg(long)]
        name: String,

        #[arg(long = "artist", required = true)]
        artists: Vec<String>,

        #[arg(long, allow_hyphen_values = true)]
        length: i64,

        /// Candidate video title
        #[arg(long)]
        title: String,

        /// Candidate duration in seconds
        #[arg(long)]
        duration: u32,

        /// Override acquisition.tolerance_seconds
        #[arg(long)]
        tolerance: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // Initialize logging
    shared::logging::init(shared::LogConfig::from_config(
        &config,
        "track-acquirer",
        cli.verbose,
    ))?;

    info!(config_file = %cli.config.display(), "Loaded configuration");

    match cli.command {
        Commands::Enqueue {
            name,
            artists,
            length,
        } => enqueue(&config, TargetTrack::new(name, artists, length)?),
        Commands::Import { file } => import(&config, &file),
        Commands::Run {
            workers,
            watch,
            task,
        } => run(&config, workers, watch, task).await,
        Commands::Status { id, status } => show_status(&config, id, status),
        Commands::Cancel { id } => cancel(&config, id),
        Commands::Review => show_review(&config),
        Commands::Check {
            name,
            artists,
            length,
            title,
            duration,
            tolerance,
        } => check(&config, TargetTrack::new(name, artists, length)?, title, duration, tolerance),
    }
}

fn open_queue(config: &Config) -> Result<TaskQueue> {
    let db_path = config.database_path();
    info!(db_path = %db_path.display(), "Opening database");
    TaskQueue::open(&db_path).context("Failed to open task queue")
}

fn enqueue(config: &Config, target: TargetTrack) -> Result<()> {
    let queue = open_queue(config)?;
    let id = queue.enqueue(&target)?;
    println!("Task {} pending: {} by {}", id, target.name, target.artist_names.join(", "));
    Ok(())
}

fn import(config: &Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let requests: Vec<TargetRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let queue = open_queue(config)?;
    let mut queued = 0;
    let mut rejected = 0;

    for request in requests {
        let name = request.name.clone();
        match request.into_target() {
            Ok(target) => {
                queue.enqueue(&target)?;
                queued += 1;
            }
            Err(e) => {
                warn!(target = %name, error = %e, "Skipping invalid target");
                rejected += 1;
            }
        }
    }

    info!(queued = queued, rejected = rejected, "Import finished");
    println!("Queued {} targets, rejected {}", queued, rejected);
    Ok(())
}

async fn run(config: &Config, workers: Option<usize>, watch: bool, task: Option<i64>) -> Result<()> {
    let db_path = config.database_path();
    let store: Arc<dyn TaskStore> = Arc::new(open_queue(config)?);
    let review = Arc::new(
        SqliteReviewQueue::open(&db_path).context("Failed to open review queue")?,
    );
    let search = Arc::new(YtDlpSearchProvider::new(&config.search));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        search,
        review,
        &config.acquisition,
    ));

    if let Some(task_id) = task {
        match scheduler.run_task(task_id).await? {
            TaskRun::Finished(report) => print_task(&report.task),
            TaskRun::NotClaimed(outcome) => bail!("Task {} was not run: {:?}", task_id, outcome),
        }
        return Ok(());
    }

    let stats = store.stats()?;
    info!(
        pending = stats.pending,
        running = stats.running,
        complete = stats.complete,
        failed = stats.failed,
        "Initial queue status"
    );

    if stats.pending == 0 && !watch {
        info!("No tasks to process, exiting");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing running tasks");
                shutdown.cancel();
            }
        }
    });

    let workers = workers.unwrap_or(config.acquisition.max_concurrent_tasks);
    let totals = scheduler.run(workers, watch, shutdown).await?;

    println!("=== Acquisition Run Complete ===");
    println!("Claimed:   {}", totals.claimed);
    println!("Completed: {}", totals.completed);
    println!("Failed:    {}", totals.failed);
    println!("Cancelled: {}", totals.cancelled);
    if totals.review_failures > 0 {
        println!("Review hand-off failures: {}", totals.review_failures);
    }
    if totals.errors > 0 {
        println!("Errors:    {}", totals.errors);
    }

    Ok(())
}

fn print_task(task: &AcquisitionTask) {
    println!(
        "#{} [{}] {} by {} ({}s)",
        task.id,
        task.status(),
        task.target.name,
        task.target.artist_names.join(", "),
        task.target.length_seconds
    );
    if let Some(CandidateVideo {
        title,
        duration_seconds,
        source_url,
        ..
    }) = task.selected_candidate()
    {
        println!("    selected: {} ({}s) {}", title, duration_seconds, source_url);
    }
    if let Some(reason) = task.failure_reason() {
        println!("    reason: {}", reason);
    }
    if task.cancel_requested && !task.status().is_terminal() {
        println!("    cancellation requested");
    }
}

fn show_status(config: &Config, id: Option<i64>, status: Option<TaskStatus>) -> Result<()> {
    let queue = open_queue(config)?;

    if let Some(id) = id {
        match queue.get(id)? {
            Some(task) => print_task(&task),
            None => bail!("Task {} not found", id),
        }
        return Ok(());
    }

    if let Some(status) = status {
        let tasks = queue.list(Some(status))?;
        for task in &tasks {
            print_task(task);
        }
        println!("{} {} tasks", tasks.len(), status);
        return Ok(());
    }

    let stats = queue.stats()?;
    println!("Total:    {}", stats.total);
    println!("Pending:  {}", stats.pending);
    println!("Running:  {}", stats.running);
    println!("Complete: {}", stats.complete);
    println!("Failed:   {}", stats.failed);
    Ok(())
}

fn cancel(config: &Config, id: i64) -> Result<()> {
    let queue = open_queue(config)?;
    if queue.request_cancel(id)? {
        println!("Cancellation requested for task {}", id);
        Ok(())
    } else {
        bail!("Task {} is not pending or running", id)
    }
}

fn show_review(config: &Config) -> Result<()> {
    let review = SqliteReviewQueue::open(config.database_path())?;
    let items = review.pending()?;

    for item in &items {
        println!(
            "#{} {} by {} -> {} ({}s) {}",
            item.task_id,
            item.target_name,
            item.target_artists.join(", "),
            item.candidate_title,
            item.duration_seconds,
            item.source_url
        );
    }
    println!("{} awaiting review", items.len());
    Ok(())
}

fn check(
    config: &Config,
    target: TargetTrack,
    title: String,
    duration: u32,
    tolerance: Option<u32>,
) -> Result<()> {
    let policy = MatchPolicy::new(tolerance.unwrap_or(config.acquisition.tolerance_seconds));
    let candidate = CandidateVideo {
        title,
        duration_seconds: duration,
        source_id: "manual".to_string(),
        source_url: String::new(),
    };

    let result = policy.evaluate(&target, &candidate);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
