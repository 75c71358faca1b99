use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use putusan_client::{HtmlDebugDir, HtmlDirSink, ReqwestTransport, write_failed_units_csv};
use putusan_core::checkpoint::JsonFileCheckpointStore;
use putusan_core::config::EngineConfig;
use putusan_core::driver::{DEFAULT_TEMPLATE, PageSequenceDriver, TracingDriverReporter, UrlTemplate};
use putusan_core::error::AppError;
use putusan_core::identity::IdentityPool;
use putusan_core::models::{FetchOutcome, FetchRequest};
use putusan_core::orchestrator::FetchOrchestrator;
use putusan_core::stats::StatsCollector;
use putusan_core::traits::{CheckpointStore, FallbackTransport, NullSink, OutcomeSink};

#[derive(Parser)]
#[command(
    name = "putusan",
    version,
    about = "Resilient fetcher for court-decision listing pages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a range of listing pages with checkpointing
    Run(RunArgs),

    /// Fetch a single URL through the full retry/escalation path
    Fetch {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Never escalate to the headless browser
        #[arg(long, default_value_t = false)]
        no_fallback: bool,
    },

    /// Inspect or reset the checkpoint record
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// First unit (page number) to fetch
    #[arg(long)]
    start: u64,

    /// Last unit (page number) to fetch, inclusive
    #[arg(long)]
    end: u64,

    /// Continue after the last checkpointed unit
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// URL template with a {unit} placeholder
    #[arg(long, env = "PUTUSAN_TEMPLATE", default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Checkpoint file
    #[arg(long, env = "PUTUSAN_CHECKPOINT", default_value = "putusan_checkpoint.json")]
    checkpoint: PathBuf,

    /// Never escalate to the headless browser
    #[arg(long, default_value_t = false)]
    no_fallback: bool,

    /// Save each fetched page as unit_NNNNN.html in this directory
    #[arg(long)]
    out: Option<PathBuf>,

    /// Save every raw response body here for inspection
    #[arg(long)]
    debug_html: Option<PathBuf>,

    /// Write failed units to this CSV file
    #[arg(long)]
    failed_csv: Option<PathBuf>,

    /// Also write the run summary JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the checkpoint record
    Show {
        #[arg(long, env = "PUTUSAN_CHECKPOINT", default_value = "putusan_checkpoint.json")]
        checkpoint: PathBuf,
    },
    /// Delete the checkpoint record
    Reset {
        #[arg(long, env = "PUTUSAN_CHECKPOINT", default_value = "putusan_checkpoint.json")]
        checkpoint: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("putusan=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut config = EngineConfig::from_env().context("Invalid configuration")?;
            if args.no_fallback {
                config.fallback.enabled = false;
            }
            let fallback = fallback_transport(&mut config);
            cmd_run(fallback, config, args).await?;
        }
        Commands::Fetch { url, no_fallback } => {
            let mut config = EngineConfig::from_env().context("Invalid configuration")?;
            if no_fallback {
                config.fallback.enabled = false;
            }
            let fallback = fallback_transport(&mut config);
            cmd_fetch(fallback, config, &url).await?;
        }
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Show { checkpoint } => cmd_checkpoint_show(checkpoint).await?,
            CheckpointAction::Reset { checkpoint } => {
                let store = JsonFileCheckpointStore::open(&checkpoint, 1)?;
                store.clear().await?;
                println!("Checkpoint {} reset", checkpoint.display());
            }
        },
    }

    Ok(())
}

#[cfg(feature = "browser")]
fn fallback_transport(config: &mut EngineConfig) -> putusan_client::BrowserTransport {
    putusan_client::BrowserTransport::new(config.fallback.clone())
}

#[cfg(not(feature = "browser"))]
fn fallback_transport(config: &mut EngineConfig) -> putusan_core::traits::NoFallback {
    if config.fallback.enabled {
        tracing::warn!("Built without the `browser` feature, escalation disabled");
        config.fallback.enabled = false;
    }
    putusan_core::traits::NoFallback
}

fn build_orchestrator<B: FallbackTransport>(
    fallback: B,
    config: &EngineConfig,
    cancel: CancellationToken,
) -> Result<FetchOrchestrator<ReqwestTransport, B>> {
    let primary =
        ReqwestTransport::new(config.request_timeout).context("Failed to create HTTP client")?;
    let orchestrator = FetchOrchestrator::new(
        primary,
        fallback,
        IdentityPool::default(),
        config,
        StatsCollector::new(),
    )?
    .with_cancellation(cancel);
    Ok(orchestrator)
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling the in-flight unit");
            token.cancel();
        }
    });
    cancel
}

/// Pages go to a directory when `--out` is set, otherwise nowhere.
enum PageSink {
    Dir(HtmlDirSink),
    Discard(NullSink),
}

impl OutcomeSink for PageSink {
    async fn deliver(&self, outcome: &FetchOutcome) -> Result<(), AppError> {
        match self {
            PageSink::Dir(sink) => sink.deliver(outcome).await,
            PageSink::Discard(sink) => sink.deliver(outcome).await,
        }
    }
}

async fn cmd_run<B: FallbackTransport>(
    fallback: B,
    config: EngineConfig,
    args: RunArgs,
) -> Result<()> {
    let template = UrlTemplate::parse(&args.template)?;
    let store = JsonFileCheckpointStore::open(&args.checkpoint, config.checkpoint_sync_interval)?;

    let mut orchestrator = build_orchestrator(fallback, &config, cancel_on_interrupt())?;
    if let Some(dir) = &args.debug_html {
        orchestrator = orchestrator.with_debug_sink(Arc::new(HtmlDebugDir::create(dir)?));
    }

    let sink = match &args.out {
        Some(dir) => PageSink::Dir(HtmlDirSink::create(dir)?),
        None => PageSink::Discard(NullSink),
    };

    tracing::info!(
        template = %template.as_str(),
        start = args.start,
        end = args.end,
        resume = args.resume,
        checkpoint = %args.checkpoint.display(),
        fallback = config.fallback.enabled,
        "Starting run"
    );

    let driver = PageSequenceDriver::new(orchestrator, store, template)
        .with_skip_statuses(config.skip_statuses.iter().copied());
    let result = driver
        .run(args.start, args.end, args.resume, &sink, &TracingDriverReporter)
        .await;
    driver.orchestrator().fallback().shutdown().await;
    let summary = result?;

    if let Some(path) = &args.failed_csv {
        write_failed_units_csv(path, &summary.failed_units)?;
        tracing::info!(path = %path.display(), count = summary.failed_units.len(), "Failed units written");
    }

    let json = serde_json::to_string_pretty(&summary)?;
    if let Some(path) = &args.summary {
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    }
    println!("{json}");

    let stats = &summary.statistics;
    tracing::info!(
        attempts = stats.total_attempts,
        success_rate = stats.success_rate(),
        escalations = stats.escalations,
        "Statistics"
    );

    Ok(())
}

async fn cmd_fetch<B: FallbackTransport>(fallback: B, config: EngineConfig, url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
    let orchestrator = build_orchestrator(fallback, &config, cancel_on_interrupt())?;

    tracing::info!("Fetching {}", url);
    let request = FetchRequest::new(url, 0, config.retry.max_attempts);
    let outcome = orchestrator.fetch(&request).await;
    orchestrator.fallback().shutdown().await;

    let report = serde_json::json!({
        "url": outcome.url(),
        "status": outcome.status().label(),
        "transport": outcome.transport_used(),
        "attempts": outcome.attempts_made(),
        "elapsed_ms": outcome.elapsed_ms(),
        "bytes": outcome.payload().map(str::len),
        "statistics": orchestrator.stats().snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !outcome.is_success() {
        anyhow::bail!("fetch failed: {}", outcome.status());
    }
    Ok(())
}

async fn cmd_checkpoint_show(path: PathBuf) -> Result<()> {
    let store = JsonFileCheckpointStore::open(&path, 1)?;
    match store.load().await {
        Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        None => println!("No checkpoint at {}", path.display()),
    }
    Ok(())
}
