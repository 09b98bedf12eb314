use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tierwatch_client::build_source;
use tierwatch_core::config::{
    BatchConfig, ResolverConfig, UpstreamConfig, source_kind_from_env,
};
use tierwatch_core::job::{JobStatus, WorkerConfig};
use tierwatch_core::job_queue::JobQueue;
use tierwatch_core::models::{GLOBAL_SCOPE, RankingEntry};
use tierwatch_core::traits::CharacterStore;
use tierwatch_core::{
    BatchScheduler, BatchScorer, MemoryRateLimitStore, MokaCacheBackend, ResolutionService,
    TracingWorkerReporter, WorkerService,
};
use tierwatch_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "tierwatch", version, about = "Character power and tier rankings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a character through the stored, cached, live and synthetic tiers
    Resolve {
        /// Server name (e.g. "Siel")
        #[arg(short, long)]
        server: String,

        /// Character name
        #[arg(short, long)]
        name: String,

        /// Skip the fresh stored record and go to the upstream
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },

    /// Show stat history for a character
    History {
        #[arg(short, long)]
        server: String,

        #[arg(short, long)]
        name: String,

        /// Number of snapshots to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Run one scoring batch now
    Score,

    /// Schedule and run scoring batches until Ctrl-C
    Worker {
        /// Worker ID (defaults to a random id)
        #[arg(long)]
        worker_id: Option<String>,

        /// Queue poll interval in seconds
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
    },

    /// Print a ranking snapshot
    Ranking {
        /// Server name, or "all" for the global ranking
        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,

        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Write the full snapshot to this CSV file instead
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// List recent scoring jobs
    Jobs {
        /// Filter by status (pending, running, completed, failed)
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every synthetic placeholder character
    PurgeSynthetic,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tierwatch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Resolve {
            server,
            name,
            refresh,
        } => cmd_resolve(&db, &server, &name, refresh).await,
        Commands::History {
            server,
            name,
            limit,
        } => cmd_history(&db, &server, &name, limit).await,
        Commands::Score => cmd_score(&db).await,
        Commands::Worker {
            worker_id,
            poll_interval,
        } => cmd_worker(&db, worker_id, poll_interval).await,
        Commands::Ranking { scope, limit, csv } => {
            cmd_ranking(&db, &scope, limit, csv.as_deref()).await
        }
        Commands::Jobs { status, limit } => cmd_jobs(&db, status, limit).await,
        Commands::PurgeSynthetic => cmd_purge(&db).await,
    }
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn cmd_resolve(db: &Database, server: &str, name: &str, refresh: bool) -> Result<()> {
    let upstream = UpstreamConfig::from_env()?;
    let resolver_config = ResolverConfig::from_env()?;
    let source = build_source(&upstream, source_kind_from_env()?)?;

    let cache = MokaCacheBackend::new(1_000, resolver_config.cache_ttl);
    let resolver = ResolutionService::new(
        source,
        db.character_repo(),
        cache,
        MemoryRateLimitStore::new(),
        resolver_config,
    );

    let resolved = resolver
        .resolve(server, name, refresh)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match &resolved.advisory {
        Some(advisory) => tracing::info!(origin = %resolved.origin, "{advisory}"),
        None => tracing::info!(origin = %resolved.origin, "Resolved"),
    }

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

async fn cmd_history(db: &Database, server: &str, name: &str, limit: usize) -> Result<()> {
    let history = db
        .character_repo()
        .stat_history(server, name, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if history.is_empty() {
        println!("No stat history for {name} on {server}");
        return Ok(());
    }

    println!("Stat history for {name} on {server}:\n");
    for (i, snapshot) in history.iter().enumerate() {
        let delta = history
            .get(i + 1)
            .map(|older| snapshot.power - older.power)
            .unwrap_or(0);
        println!(
            "  {}  Lv.{:<3} power {:>10} ({:+})  atk {} / crit {} / hp {}",
            snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
            snapshot.level,
            snapshot.power,
            delta,
            snapshot.stats.attack,
            snapshot.stats.crit_rate,
            snapshot.stats.hp,
        );
    }

    println!("\nTotal: {} snapshots", history.len());
    Ok(())
}

async fn cmd_score(db: &Database) -> Result<()> {
    let scorer = BatchScorer::new(db.character_repo(), BatchConfig::from_env()?);
    let report = scorer.run().await.map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        servers = report.servers,
        snapshots = report.snapshots,
        "Scoring batch finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_worker(db: &Database, worker_id: Option<String>, poll_interval: u64) -> Result<()> {
    let batch = BatchConfig::from_env()?;
    let mut config = WorkerConfig::default().with_poll_interval(Duration::from_secs(poll_interval));
    if let Some(id) = worker_id {
        config = config.with_worker_id(id);
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let scheduler = BatchScheduler::new(db.job_repo(), batch.interval);
    let scheduler_token = cancel.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    let worker = WorkerService::new(db.job_repo(), db.character_repo(), batch, config);
    worker
        .run(cancel, &TracingWorkerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    scheduler_task.await.context("Scheduler task panicked")?;
    Ok(())
}

async fn cmd_ranking(db: &Database, scope: &str, limit: usize, csv: Option<&Path>) -> Result<()> {
    let snapshot = db
        .character_repo()
        .ranking_snapshot(scope)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let Some(snapshot) = snapshot else {
        println!("No ranking for scope '{scope}' yet. Run `tierwatch score` first.");
        return Ok(());
    };

    if let Some(path) = csv {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_ranking_csv(&snapshot.entries, file)?;
        tracing::info!(entries = snapshot.entries.len(), path = %path.display(), "Ranking exported");
        return Ok(());
    }

    println!(
        "Ranking '{}' generated {}:\n",
        snapshot.scope,
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for entry in snapshot.entries.iter().take(limit) {
        println!(
            "  {:>4}. {:<3} {:<20} {:<10} Lv.{:<3} index {:>6}",
            entry.rank, entry.tier_rank, entry.name, entry.server, entry.level, entry.power_index,
        );
    }
    println!("\nTotal: {} ranked", snapshot.entries.len());
    Ok(())
}

/// Write ranking entries as CSV with a header row.
fn write_ranking_csv<W: Write>(entries: &[RankingEntry], writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for entry in entries {
        out.serialize(entry)?;
    }
    out.flush()?;
    Ok(())
}

async fn cmd_jobs(db: &Database, status: Option<JobStatus>, limit: usize) -> Result<()> {
    let jobs = db
        .job_repo()
        .list_jobs(status, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in &jobs {
        println!(
            "  {}  {:<10} {:<18} retries {}/{}  {}",
            job.id,
            job.status,
            job.kind,
            job.retry_count,
            job.max_retries,
            job.error_message.as_deref().unwrap_or(""),
        );
    }
    println!("\nTotal: {} jobs", jobs.len());
    Ok(())
}

async fn cmd_purge(db: &Database) -> Result<()> {
    let deleted = db
        .character_repo()
        .purge_synthetic()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("Deleted {deleted} synthetic characters");
    Ok(())
}
