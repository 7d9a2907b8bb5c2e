//! Try-on dataset forge CLI
//!
//! Runs the edit and try-on drivers against object storage and offers the
//! maintenance commands that go with them.

use super::config::CliConfigBuilder;
use crate::{
    backends::HttpGenerationBackend,
    config::{BackendConfig, ManifestPolicy, StoreConfig, DEFAULT_QUEUE_CAPACITY},
    filter::WorkFilter,
    generation::{GenerationBackend, ModelVariant},
    jobs::{EditJob, Job, VtonJob},
    keys::{Category, Group},
    manifest::verify_manifest,
    pipeline::{Pipeline, RunSummary},
    services::create_cli_progress_reporter,
    storage::{ObjectStore, S3ObjectStore},
    tools::{generate_scripts, scan_prefix_tree, ScriptDriver, DEFAULT_VTON_PARTITIONS},
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Generate edited and virtual try-on images from a bucket of person images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vton-forge")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Tracing filter directive overriding the verbosity (e.g. "vton_forge=debug")
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Log rendering: console, plain (or json with the tracing-json feature)
    #[arg(long, global = true, default_value_t = TracingFormat::Console)]
    pub log_format: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply edit prompts to source person images
    Edit(RunArgs),

    /// Dress edited images in random garments and write a manifest
    Vton {
        #[command(flatten)]
        run: RunArgs,

        /// When manifest entries are recorded
        #[arg(long, value_enum, default_value_t = CliManifestPolicy::Optimistic)]
        manifest_policy: CliManifestPolicy,
    },

    /// Check that every artifact referenced by a manifest exists
    VerifyManifest {
        /// Manifest object key
        key: String,
    },

    /// Print a directory tree with file counts for a prefix
    Tree {
        /// Key prefix to scan
        prefix: String,
    },

    /// Write one launch script per partitioned job
    Scripts(ScriptArgs),
}

/// Flags shared by the edit and try-on drivers
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Model variant: nvfp4, 4b or 9b
    #[arg(long, default_value = "9b")]
    pub model: ModelVariant,

    /// Restrict to one category (easy, medium, hard)
    #[arg(long)]
    pub category: Option<Category>,

    /// Restrict to one group (female, male)
    #[arg(long)]
    pub group: Option<Group>,

    /// Restrict to one partition (`partition_3` or `3`)
    #[arg(long)]
    pub partition: Option<String>,

    /// Packages buffered between download and generation
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Backlog processing order
    #[arg(long, value_enum, default_value_t = CliOrder::Sorted)]
    pub order: CliOrder,

    /// Seed for the shuffled order and the garment draw
    #[arg(long)]
    pub seed: Option<u64>,

    /// Show a progress bar instead of per-item log lines
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScriptArgs {
    /// Job the scripts launch
    #[arg(long)]
    pub driver: ScriptDriver,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Partition ids per category and group (try-on scripts only)
    #[arg(long)]
    pub partitions: Option<u32>,

    /// Model variant passed to every script
    #[arg(long, default_value = "9b")]
    pub model: ModelVariant,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliOrder {
    Sorted,
    Shuffled,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliManifestPolicy {
    Optimistic,
    Confirmed,
}

impl From<CliManifestPolicy> for ManifestPolicy {
    fn from(policy: CliManifestPolicy) -> Self {
        match policy {
            CliManifestPolicy::Optimistic => ManifestPolicy::Optimistic,
            CliManifestPolicy::Confirmed => ManifestPolicy::Confirmed,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format, cli.log_filter.as_deref())
        .context("Failed to initialize tracing")?;

    let result = match &cli.command {
        Command::Edit(args) => run_edit(args, cli.verbose, &session_id).await,
        Command::Vton {
            run,
            manifest_policy,
        } => run_vton(run, (*manifest_policy).into(), cli.verbose, &session_id).await,
        Command::VerifyManifest { key } => {
            verify(key)
                .instrument(spans::maintenance("verify-manifest", key))
                .await
        },
        Command::Tree { prefix } => tree(prefix).instrument(spans::maintenance("tree", prefix)).await,
        Command::Scripts(args) => scripts(args),
    };

    if let Err(error) = &result {
        events::error_with_context(&**error, command_name(&cli.command));
    }
    result
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Edit(_) => "edit",
        Command::Vton { .. } => "vton",
        Command::VerifyManifest { .. } => "verify-manifest",
        Command::Tree { .. } => "tree",
        Command::Scripts(_) => "scripts",
    }
}

async fn connect_store() -> Arc<dyn ObjectStore> {
    let config = StoreConfig::from_env();
    info!(bucket = %config.bucket, region = %config.region, "🪣 Connecting to object storage");
    Arc::new(S3ObjectStore::connect(&config).await)
}

/// Build the HTTP backend and run its health check off the async workers
async fn init_backend(model: ModelVariant) -> Result<Arc<dyn GenerationBackend>> {
    let config = BackendConfig::from_env(model);
    info!(endpoint = %config.endpoint, model = %model, "🔌 Initializing generation backend");
    let mut backend = HttpGenerationBackend::new(config).context("Failed to create generation backend")?;

    let (backend, elapsed) = tokio::task::spawn_blocking(move || {
        backend.initialize().map(|elapsed| (backend, elapsed))
    })
    .await
    .context("Backend initialization task failed")?
    .context("Failed to initialize generation backend")?;

    if let Some(elapsed) = elapsed {
        info!(elapsed_ms = elapsed.as_millis(), "✅ Generation backend ready");
    }
    Ok(Arc::new(backend))
}

async fn run_job<J>(
    job: Arc<J>,
    args: &RunArgs,
    policy: ManifestPolicy,
    filter: &WorkFilter,
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn ObjectStore>,
    verbose: u8,
) -> Result<RunSummary>
where
    J: Job + 'static,
{
    let config = CliConfigBuilder::pipeline_config(args, policy).context("Invalid pipeline configuration")?;
    let reporter = create_cli_progress_reporter(args.progress, verbose > 0);
    let pipeline = Pipeline::new(store, backend, config).with_reporter(reporter);

    let summary = pipeline.run(job, filter).await.context("Pipeline run failed")?;
    print_summary(&summary)?;
    Ok(summary)
}

async fn run_edit(args: &RunArgs, verbose: u8, session_id: &str) -> Result<()> {
    CliConfigBuilder::validate_run_args(args).context("Invalid CLI arguments")?;
    let filter = CliConfigBuilder::filter(args);

    async {
        let store = connect_store().await;
        let backend = init_backend(args.model).await?;
        let job = Arc::new(EditJob::new(CliConfigBuilder::layout()));
        run_job(job, args, ManifestPolicy::default(), &filter, backend, store, verbose).await
    }
    .instrument(spans::run(session_id, "edit", args.model.name()))
    .await
    .map(|_| ())
}

async fn run_vton(args: &RunArgs, policy: ManifestPolicy, verbose: u8, session_id: &str) -> Result<()> {
    CliConfigBuilder::validate_run_args(args).context("Invalid CLI arguments")?;
    let filter = CliConfigBuilder::filter(args);

    async {
        let store = connect_store().await;
        let backend = init_backend(args.model).await?;
        let job = VtonJob::load(store.as_ref(), CliConfigBuilder::layout(), &filter, args.seed).await;
        if filter.groups().into_iter().all(|group| job.clothes_for(group).is_empty()) {
            warn!("⚠️  No clothes found, every item will be skipped");
        }
        run_job(Arc::new(job), args, policy, &filter, backend, store, verbose).await
    }
    .instrument(spans::run(session_id, "vton", args.model.name()))
    .await
    .map(|_| ())
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    println!("{json}");
    Ok(())
}

async fn verify(key: &str) -> Result<()> {
    let store = connect_store().await;
    let report = verify_manifest(store.as_ref(), key)
        .await
        .with_context(|| format!("Failed to verify manifest {key}"))?;

    println!(
        "{}: {} entries, {} complete",
        report.key, report.total_entries, report.complete_entries
    );
    for entry in &report.incomplete {
        println!("  line {}: missing {}", entry.line, entry.missing.join(", "));
    }
    for line in &report.malformed {
        println!("  line {}: malformed ({})", line.line, line.error);
    }

    if !report.is_consistent() {
        anyhow::bail!(
            "Manifest {} has {} incomplete and {} malformed entries",
            report.key,
            report.incomplete.len(),
            report.malformed.len()
        );
    }
    Ok(())
}

async fn tree(prefix: &str) -> Result<()> {
    let store = connect_store().await;
    println!("Scanning {} ...", store.uri(prefix));
    let tree = scan_prefix_tree(store.as_ref(), prefix)
        .await
        .with_context(|| format!("Failed to list {prefix}"))?;
    print!("{}", tree.render());
    Ok(())
}

fn scripts(args: &ScriptArgs) -> Result<()> {
    let partitions = args.partitions.unwrap_or(DEFAULT_VTON_PARTITIONS);
    let written = generate_scripts(args.driver, &args.out, partitions, args.model)
        .with_context(|| format!("Failed to write scripts to {}", args.out.display()))?;
    for path in &written {
        println!("Generated: {}", path.display());
    }
    Ok(())
}
