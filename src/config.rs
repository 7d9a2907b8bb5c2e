//! Run configuration: storage credentials, generation endpoint, key layout
//! and pipeline tuning.
//!
//! Everything is resolved once at process start and passed by reference into
//! the storage client, the generation backend and the pipeline driver.

use crate::error::{ForgeError, Result};
use crate::generation::ModelVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Bucket used when `S3_BUCKET_NAME` is unset
pub const DEFAULT_BUCKET: &str = "p1-to-ep1";
/// Region used when `S3_REGION` is unset
pub const DEFAULT_REGION: &str = "us-east-1";
/// Generation service used when `GENERATION_ENDPOINT` is unset
pub const DEFAULT_GENERATION_ENDPOINT: &str = "http://127.0.0.1:8188";
/// Per-request timeout for the generation service
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 600;
/// Download-ahead depth of the producer/consumer queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
/// Concurrent generation calls allowed through the gate
pub const DEFAULT_GATE_PERMITS: usize = 1;

/// Object storage connection settings
#[derive(Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible stores (`MinIO`, R2, ...)
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl StoreConfig {
    /// Configuration for `bucket` with default region and ambient credentials
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }

    /// Load from the process environment, reading a `.env` file first if present
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            bucket: non_empty("S3_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            region: non_empty("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
            endpoint_url: non_empty("S3_ENDPOINT_URL"),
            force_path_style: non_empty("S3_FORCE_PATH_STYLE")
                .is_some_and(|value| parse_flag(&value)),
        }
    }

    /// Whether a complete static credential pair is configured
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Generation service settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub variant: ModelVariant,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GENERATION_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            variant: ModelVariant::default(),
        }
    }
}

impl BackendConfig {
    /// Load endpoint and timeout from the environment
    pub fn from_env(variant: ModelVariant) -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(variant, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(variant: ModelVariant, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("GENERATION_ENDPOINT")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(
                || DEFAULT_GENERATION_ENDPOINT.to_string(),
                |value| value.trim_end_matches('/').to_string(),
            );
        let timeout = lookup("GENERATION_TIMEOUT_SECS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS);

        Self {
            endpoint,
            timeout: Duration::from_secs(timeout),
            variant,
        }
    }
}

/// Storage roots of the dataset hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    /// Edit prompt text files, `{root}/{category}/{group_dir}/{partition}/...`
    pub edit_prompts_root: String,
    /// Source person images, `{root}/{group}/{group}/images/{subject}.png`
    pub images_root: String,
    /// Edited person images, also the try-on input set
    pub output_root: String,
    /// Garment images and their prompts
    pub clothes_root: String,
    /// Try-on triplets and manifests
    pub ultimate_root: String,
    /// Token prepended to the group name in prompt directories
    pub prompt_group_dir_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            edit_prompts_root: "dataset/edit_prompts".to_string(),
            images_root: "dataset".to_string(),
            output_root: "edited_images".to_string(),
            clothes_root: "dataset/clothes".to_string(),
            ultimate_root: "dataset_ultimate".to_string(),
            prompt_group_dir_prefix: "edit_".to_string(),
        }
    }
}

impl KeyLayout {
    /// Reject roots that would put keys at the bucket top level
    ///
    /// # Errors
    /// - A root is empty or only slashes
    pub fn validate(&self) -> Result<()> {
        for (name, root) in [
            ("edit_prompts_root", &self.edit_prompts_root),
            ("images_root", &self.images_root),
            ("output_root", &self.output_root),
            ("clothes_root", &self.clothes_root),
            ("ultimate_root", &self.ultimate_root),
        ] {
            if root.trim_matches('/').is_empty() {
                return Err(ForgeError::invalid_config(format!(
                    "layout root '{name}' must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Order in which the producer walks the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkOrder {
    /// Lexicographic key order; reruns see the same sequence
    #[default]
    Sorted,
    /// Random permutation, reproducible when a seed is given
    Shuffled { seed: Option<u64> },
}

/// When a try-on manifest entry is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManifestPolicy {
    /// Record the entry as soon as its uploads are scheduled
    #[default]
    Optimistic,
    /// Record the entry only after every upload of its group succeeded
    Confirmed,
}

/// Tuning for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded queue depth between download and generation stages
    pub queue_capacity: usize,
    /// Maximum concurrent generation calls
    pub gate_permits: usize,
    pub order: WorkOrder,
    pub manifest_policy: ManifestPolicy,
}

impl PipelineConfig {
    /// Create a new pipeline configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            gate_permits: DEFAULT_GATE_PERMITS,
            order: WorkOrder::default(),
            manifest_policy: ManifestPolicy::default(),
        }
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn gate_permits(mut self, permits: usize) -> Self {
        self.config.gate_permits = permits;
        self
    }

    #[must_use]
    pub fn order(mut self, order: WorkOrder) -> Self {
        self.config.order = order;
        self
    }

    #[must_use]
    pub fn manifest_policy(mut self, policy: ManifestPolicy) -> Self {
        self.config.manifest_policy = policy;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    /// - `queue_capacity` or `gate_permits` is zero
    pub fn build(self) -> Result<PipelineConfig> {
        if self.config.queue_capacity == 0 {
            return Err(ForgeError::config_value_error(
                "queue_capacity",
                self.config.queue_capacity,
                ">= 1",
            ));
        }
        if self.config.gate_permits == 0 {
            return Err(ForgeError::config_value_error(
                "gate_permits",
                self.config.gate_permits,
                ">= 1",
            ));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.bucket, DEFAULT_BUCKET);
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(!config.has_static_credentials());
        assert!(!config.force_path_style);
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn test_store_config_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "vton-test"),
            ("S3_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("S3_ENDPOINT_URL", "http://localhost:9000"),
            ("S3_FORCE_PATH_STYLE", "TRUE"),
        ]));
        assert_eq!(config.bucket, "vton-test");
        assert_eq!(config.region, "eu-west-1");
        assert!(config.has_static_credentials());
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(config.force_path_style);
    }

    #[test]
    fn test_store_config_debug_redacts_secret() {
        let config = StoreConfig::from_lookup(lookup_from(&[("AWS_SECRET_ACCESS_KEY", "hunter2")]));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_backend_config_lookup() {
        let config = BackendConfig::from_lookup(
            ModelVariant::Nvfp4,
            lookup_from(&[
                ("GENERATION_ENDPOINT", "http://gpu-box:9000/"),
                ("GENERATION_TIMEOUT_SECS", "30"),
            ]),
        );
        assert_eq!(config.endpoint, "http://gpu-box:9000");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.variant, ModelVariant::Nvfp4);

        let config = BackendConfig::from_lookup(
            ModelVariant::default(),
            lookup_from(&[("GENERATION_TIMEOUT_SECS", "zero")]),
        );
        assert_eq!(config.endpoint, DEFAULT_GENERATION_ENDPOINT);
        assert_eq!(
            config.timeout,
            Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.gate_permits, 1);
        assert_eq!(config.order, WorkOrder::Sorted);
        assert_eq!(config.manifest_policy, ManifestPolicy::Optimistic);
    }

    #[test]
    fn test_pipeline_config_validation() {
        let err = PipelineConfig::builder().queue_capacity(0).build().unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
        assert!(err.to_string().contains("queue_capacity"));

        let err = PipelineConfig::builder().gate_permits(0).build().unwrap_err();
        assert!(err.to_string().contains("gate_permits"));
    }

    #[test]
    fn test_layout_validation() {
        assert!(KeyLayout::default().validate().is_ok());

        let layout = KeyLayout {
            ultimate_root: "/".to_string(),
            ..KeyLayout::default()
        };
        let err = layout.validate().unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
        assert!(err.to_string().contains("ultimate_root"));
    }

    #[test]
    fn test_pipeline_config_builder_chain() {
        let config = PipelineConfig::builder()
            .queue_capacity(2)
            .gate_permits(3)
            .order(WorkOrder::Shuffled { seed: Some(7) })
            .manifest_policy(ManifestPolicy::Confirmed)
            .build()
            .unwrap();
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.gate_permits, 3);
        assert_eq!(config.order, WorkOrder::Shuffled { seed: Some(7) });
        assert_eq!(config.manifest_policy, ManifestPolicy::Confirmed);
    }
}
