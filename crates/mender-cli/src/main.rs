//! Mender CLI
//!
//! Heals selectors against DOM snapshots stored as JSON files, either a
//! snapshot document (`{"page_url", "captured_at", "root"}`) or a bare
//! element tree (`{"tag", "attributes", "text", "children"}`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mender_core::config::TelemetryConfig;
use mender_core::dto::{BatchHealRequestDto, BatchSelectorDto, HealRequestDto, PlaygroundRequest};
use mender_core::{HealingConfig, HealingService, RecordingPublisher, StaticSnapshotSource};
use mender_dom::diff;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod input;
mod output;

use input::load_snapshot;

#[derive(Parser)]
#[command(name = "mender")]
#[command(author, version, about = "Heal broken selectors against DOM snapshots", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (.toml or .json); defaults to the first mender config in the working directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Heal one selector
    Heal(HealArgs),

    /// Heal several selectors of one page
    Batch(BatchArgs),

    /// Structural diff between two snapshots
    Diff {
        before: PathBuf,
        after: PathBuf,
    },

    /// Evaluate a selector against a snapshot
    Query {
        snapshot: PathBuf,
        selector: String,
    },

    /// List healing strategies in priority order
    Strategies,
}

#[derive(Args)]
struct Pages {
    /// Snapshot from when the selector worked
    #[arg(long)]
    baseline: PathBuf,

    /// Snapshot of the page now
    #[arg(long)]
    current: PathBuf,

    /// Page URL; taken from the current snapshot when omitted
    #[arg(long)]
    url: Option<String>,
}

#[derive(Args)]
struct HealArgs {
    #[command(flatten)]
    pages: Pages,

    /// The selector that stopped matching
    selector: String,

    /// Run only this strategy
    #[arg(long)]
    strategy: Option<String>,
}

#[derive(Args)]
struct BatchArgs {
    #[command(flatten)]
    pages: Pages,

    /// Selectors to heal
    #[arg(short, long = "selector", required_unless_present = "file")]
    selectors: Vec<String>,

    /// JSON list of `{id, selector, expectedElementType}`
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = HealingConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.telemetry);

    match cli.command {
        Commands::Heal(args) => heal(config, args, cli.json).await,
        Commands::Batch(args) => batch(config, args, cli.json).await,
        Commands::Diff { before, after } => {
            let before = load_snapshot(&before, None)?;
            let after = load_snapshot(&after, None)?;
            output::diff(&diff(&before, &after), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query { snapshot, selector } => {
            let snapshot = load_snapshot(&snapshot, None)?;
            let service = service(config, StaticSnapshotSource::new());
            let response = service.playground(&snapshot, &PlaygroundRequest { selector })?;
            output::query(&snapshot, &response, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Strategies => {
            let service = service(config, StaticSnapshotSource::new());
            output::strategies(&service.strategies(), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if telemetry.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn service(config: HealingConfig, source: StaticSnapshotSource) -> HealingService {
    HealingService::new(config, Arc::new(source), Arc::new(RecordingPublisher::new()))
}

/// Register both snapshots under one URL
fn register(pages: &Pages) -> Result<(String, StaticSnapshotSource)> {
    let current = load_snapshot(&pages.current, pages.url.as_deref())?;
    let url = pages
        .url
        .clone()
        .or_else(|| current.page_url().map(str::to_string))
        .unwrap_or_else(|| file_url(&pages.current));
    let baseline = load_snapshot(&pages.baseline, Some(&url))?;
    info!(page_url = %url, nodes = current.len(), "snapshots loaded");
    Ok((url.clone(), StaticSnapshotSource::new().with_page(&url, baseline, current)))
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

async fn heal(config: HealingConfig, args: HealArgs, json: bool) -> Result<ExitCode> {
    let (url, source) = register(&args.pages)?;
    let service = service(config, source);
    let response = service
        .heal(HealRequestDto {
            url,
            broken_selector: args.selector,
            strategy: args.strategy,
            test_id: None,
        })
        .await?;
    let attempt = service.attempt(response.attempt_id).await?;
    output::heal(&response, &attempt, json)?;
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn batch(config: HealingConfig, args: BatchArgs, json: bool) -> Result<ExitCode> {
    let (url, source) = register(&args.pages)?;
    let mut selectors: Vec<BatchSelectorDto> = args
        .selectors
        .into_iter()
        .map(|selector| BatchSelectorDto {
            id: None,
            selector,
            expected_element_type: None,
        })
        .collect();
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let listed: Vec<BatchSelectorDto> =
            serde_json::from_str(&content).with_context(|| format!("{} is not a selector list", path.display()))?;
        selectors.extend(listed);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing running selectors");
            on_interrupt.cancel();
        }
    });

    let service = service(config, source);
    let response = service
        .heal_batch(BatchHealRequestDto { url, selectors }, &cancel)
        .await?;
    output::batch(&response, json)?;
    Ok(if response.summary.failed == 0 && !response.cancelled {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
