#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

//! # vton-forge
//!
//! Batch generation of edited person images and virtual try-on samples
//! against object storage.
//!
//! Every job runs through the same two-stage pipeline: a download stage
//! fetches the inputs of one item at a time and pushes them onto a bounded
//! queue, and a generation stage pops them in order, runs the image model
//! behind a counting gate and hands the results to background uploads.
//! Outputs that already exist when a run starts are skipped, so interrupted
//! runs can simply be restarted.
//!
//! ## Features
//!
//! - **Edit job**: applies text edit prompts to source person images
//! - **Try-on job**: dresses edited images in randomly drawn garments and
//!   writes a JSON-lines manifest of the produced triplets
//! - **Resume by listing**: one listing pass at startup decides what to skip
//! - **Partition sharding**: category, group and partition filters narrow
//!   both listing and processing
//! - **Pluggable storage and generation**: S3-compatible and in-memory
//!   stores, HTTP and mock generation backends
//! - **CLI Integration**: optional command-line interface (`cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vton_forge::{
//!     EditJob, GenerationBackend, KeyLayout, MemoryObjectStore, MockGenerationBackend,
//!     Pipeline, PipelineConfig, WorkFilter,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryObjectStore::new());
//! let mut backend = MockGenerationBackend::new();
//! backend.initialize()?;
//!
//! let pipeline = Pipeline::new(store, Arc::new(backend), PipelineConfig::default());
//! let job = Arc::new(EditJob::new(KeyLayout::default()));
//! let summary = pipeline.run(job, &WorkFilter::new()).await?;
//! println!("generated {} images", summary.generated);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bar and tracing setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod generation;
pub mod jobs;
pub mod keys;
pub mod manifest;
pub mod pipeline;
pub mod resume;
pub mod services;
pub mod storage;
pub mod tools;
#[cfg(feature = "cli")]
pub mod tracing_config;

// Public API exports
pub use backends::{GenerationParameters, HttpGenerationBackend, MockGenerationBackend};
pub use config::{
    BackendConfig, KeyLayout, ManifestPolicy, PipelineConfig, PipelineConfigBuilder, StoreConfig,
    WorkOrder,
};
pub use enumerate::enumerate_candidates;
pub use error::{ForgeError, Result};
pub use filter::WorkFilter;
pub use generation::{GenerationBackend, GenerationRequest, ModelVariant};
pub use jobs::{EditJob, Job, VtonJob};
pub use keys::{ArtifactKind, Category, Group, WorkItem};
pub use manifest::{verify_manifest, ManifestBuffer, ManifestEntry, ManifestVerification};
pub use pipeline::{Pipeline, RunSummary, WorkPackage};
pub use resume::ResumeIndex;
pub use services::{
    ImageCodec, ItemEvent, LogProgressReporter, NoOpProgressReporter, PipelineStage,
    ProgressReporter,
};
pub use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use tools::{generate_scripts, scan_prefix_tree, PrefixTree, ScriptDriver};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};
