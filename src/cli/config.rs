//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CliOrder, RunArgs};
use crate::{
    config::{KeyLayout, ManifestPolicy, PipelineConfig, WorkOrder},
    filter::WorkFilter,
    keys::{is_partition_label, PARTITION_MARKER},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to pipeline configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Storage layout used by the CLI drivers
    pub(crate) fn layout() -> KeyLayout {
        KeyLayout::default()
    }

    /// Accept `partition_3` as-is and expand a bare `3`
    pub(crate) fn normalize_partition(partition: &str) -> String {
        let trimmed = partition.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            format!("{PARTITION_MARKER}_{trimmed}")
        } else {
            trimmed.to_string()
        }
    }

    pub(crate) fn filter(args: &RunArgs) -> WorkFilter {
        WorkFilter {
            category: args.category,
            group: args.group,
            partition: args.partition.as_deref().map(Self::normalize_partition),
        }
    }

    pub(crate) fn work_order(args: &RunArgs) -> WorkOrder {
        match args.order {
            CliOrder::Sorted => WorkOrder::Sorted,
            CliOrder::Shuffled => WorkOrder::Shuffled { seed: args.seed },
        }
    }

    /// Build the pipeline configuration for a run
    pub(crate) fn pipeline_config(args: &RunArgs, policy: ManifestPolicy) -> Result<PipelineConfig> {
        PipelineConfig::builder()
            .queue_capacity(args.queue_capacity)
            .order(Self::work_order(args))
            .manifest_policy(policy)
            .build()
            .context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_run_args(args: &RunArgs) -> Result<()> {
        if args.queue_capacity == 0 {
            anyhow::bail!("--queue-capacity must be at least 1");
        }
        if let Some(partition) = &args.partition {
            let normalized = Self::normalize_partition(partition);
            if !is_partition_label(&normalized) {
                anyhow::bail!("Invalid partition '{partition}', expected e.g. partition_3 or 3");
            }
        }
        Ok(())
    }
}
