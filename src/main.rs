use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use tw_viralbot::config;
use tw_viralbot::gate::{AdmissionGate, GateConfig};
use tw_viralbot::model::WorkStatus;
use tw_viralbot::orchestrator::{Limits, Orchestrator};
use tw_viralbot::platform::PlatformClient;
use tw_viralbot::rate_limit::RateLimitTracker;
use tw_viralbot::retry::RetryPolicy;
use tw_viralbot::session::SessionStore;
use tw_viralbot::store::DocumentStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a producer pass: derive new work items from platform signals.
    Prepare,
    /// Run a consumer pass: execute every ready item in order.
    Process,
    /// Attach generated content to pending items, making them ready.
    Respond {
        /// Work item id (omit when using --batch)
        #[arg(required_unless_present = "batch")]
        id: Option<String>,
        /// Generated text for the item
        #[arg(required_unless_present = "batch")]
        text: Option<String>,
        /// JSON file mapping item ids to generated text
        #[arg(long, conflicts_with_all = ["id", "text"])]
        batch: Option<PathBuf>,
    },
    /// Print a summary of the queue and rate-limit standing.
    Status,
    /// Print an example configuration file.
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if matches!(args.command, Command::ExampleConfig) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let base_url = Url::parse(&cfg.platform.base_url)
        .with_context(|| format!("invalid platform.base_url {}", cfg.platform.base_url))?;
    let session = match &cfg.platform.login_cookie {
        Some(cookie) => Arc::new(SessionStore::with_cookie(cookie.clone())),
        None => Arc::new(SessionStore::new()),
    };
    let gate = AdmissionGate::new(GateConfig {
        max_concurrent: cfg.limits.max_qps,
        interval: Duration::from_millis(cfg.limits.window_ms),
        interval_cap: cfg.limits.max_qps,
    });
    let rate_limits = Arc::new(RateLimitTracker::new());
    let retry = RetryPolicy {
        max_retries: cfg.retry.max_retries,
        base_delay: Duration::from_millis(cfg.retry.base_delay_ms),
    };

    let platform = Arc::new(PlatformClient::new(
        base_url,
        cfg.platform.api_key.clone(),
        session,
        gate.clone(),
        Arc::clone(&rate_limits),
        retry,
    ));
    let store = DocumentStore::new(cfg.queue_path(), cfg.state_path());
    let orchestrator = Orchestrator::new(
        platform,
        store,
        Limits::from(&cfg.limits),
        cfg.platform.target_username.clone(),
        cfg.search.query.clone(),
        gate,
        rate_limits,
    );

    match args.command {
        Command::Prepare => {
            let summary = orchestrator.produce_pass().await?;
            orchestrator.idle().await;
            info!(
                added = summary.added,
                pending = summary.counts.pending,
                ready = summary.counts.ready,
                "prepare finished"
            );
        }
        Command::Process => {
            let summary = orchestrator.process_pass().await?;
            orchestrator.idle().await;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "process finished"
            );
        }
        Command::Respond { id, text, batch } => match batch {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading batch file {}", path.display()))?;
                let responses: BTreeMap<String, String> = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing batch file {}", path.display()))?;
                let responses: Vec<(String, String)> = responses.into_iter().collect();
                let attached = orchestrator.attach_batch(&responses).await?;
                info!(attached, total = responses.len(), "batch respond finished");
            }
            None => {
                // clap guarantees both are present without --batch.
                let (Some(id), Some(text)) = (id, text) else {
                    unreachable!("clap enforces id and text without --batch");
                };
                orchestrator.attach_response(&id, &text).await?;
            }
        },
        Command::Status => {
            let queue = orchestrator.queue_snapshot().await;
            let counts = queue.counts();
            println!(
                "queue: {} items ({} pending, {} ready, {} completed, {} failed)",
                queue.items.len(),
                counts.pending,
                counts.ready,
                counts.completed,
                counts.failed
            );
            for item in queue
                .items
                .iter()
                .filter(|item| item.status == WorkStatus::Pending)
            {
                println!("  awaiting content: {} ({})", item.id, item.kind.as_str());
            }
        }
        Command::ExampleConfig => unreachable!("handled before config load"),
    }

    Ok(())
}
