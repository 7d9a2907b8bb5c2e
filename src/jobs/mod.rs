//! Batch jobs that plug into the shared pipeline
//!
//! A [`Job`] decides which keys are candidates, where outputs go, which
//! inputs to fetch and what to upload. The pipeline stages handle ordering,
//! resume, backpressure, gating and upload supervision.

mod edit;
mod vton;

pub use edit::{EditJob, EDIT_STRENGTH};
pub use vton::{VtonJob, DEFAULT_VTON_PROMPT, VTON_STEPS};

use crate::config::KeyLayout;
use crate::filter::WorkFilter;
use crate::generation::GenerationRequest;
use crate::keys::WorkItem;
use crate::manifest::ManifestEntry;
use crate::pipeline::{Artifact, MissingInput, WorkPackage};
use crate::services::ImageCodec;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

/// What differs between the edit and try-on drivers
#[async_trait]
pub trait Job: Send + Sync {
    /// Short job name for logs and summaries
    fn name(&self) -> &'static str;

    /// Storage roots every key of the job is derived from
    fn layout(&self) -> &KeyLayout;

    /// Extension candidate keys must carry (without the dot)
    fn source_extension(&self) -> &'static str;

    /// Prefixes listed to find candidate inputs
    fn candidate_prefixes(&self, filter: &WorkFilter) -> Vec<String>;

    /// Prefixes listed to build the resume index
    fn resume_prefixes(&self, filter: &WorkFilter) -> Vec<String>;

    /// Parse a candidate key; `None` for keys that are not work items
    fn parse(&self, key: &str) -> Option<WorkItem>;

    /// Deterministic output key checked against the resume index
    fn target_key(&self, item: &WorkItem) -> String;

    /// Fetch every input of `item` concurrently
    async fn fetch(
        &self,
        store: &dyn ObjectStore,
        item: WorkItem,
        target_key: String,
    ) -> Result<WorkPackage, MissingInput>;

    /// Generation call for a package
    fn request(&self, package: &WorkPackage) -> GenerationRequest;

    /// Uploads produced from a successful generation
    fn artifacts(&self, package: &WorkPackage, output: DynamicImage) -> Vec<Artifact>;

    /// Manifest line describing the package's artifacts
    fn manifest_entry(&self, _store: &dyn ObjectStore, _package: &WorkPackage) -> Option<ManifestEntry> {
        None
    }

    /// Where the run's manifest is written, if the job keeps one
    fn manifest_key(&self, _filter: &WorkFilter) -> Option<String> {
        None
    }
}

/// Download and decode one image; every failure mode becomes a skip
pub(crate) async fn fetch_image(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<Arc<DynamicImage>, MissingInput> {
    let bytes = match store.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Err(MissingInput::new(key, "not found")),
        Err(e) => return Err(MissingInput::new(key, e.to_string())),
    };

    let decoded = tokio::task::spawn_blocking(move || ImageCodec::decode(&bytes))
        .await
        .map_err(|e| MissingInput::new(key, format!("decode task failed: {e}")))?;

    decoded
        .map(Arc::new)
        .map_err(|e| MissingInput::new(key, e.to_string()))
}

/// Download prompt text; absent or blank text is `None`
pub(crate) async fn fetch_prompt(store: &dyn ObjectStore, key: &str) -> Option<String> {
    match store.get_text(key).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Prompt download failed");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use image::RgbImage;

    #[tokio::test]
    async fn test_fetch_image_outcomes() {
        let store = MemoryObjectStore::new();
        let png = ImageCodec::encode_png(&DynamicImage::ImageRgb8(RgbImage::new(3, 2))).unwrap();
        store.insert("ok.png", png);
        store.insert("broken.png", b"nope".to_vec());

        let image = fetch_image(&store, "ok.png").await.unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));

        let missing = fetch_image(&store, "absent.png").await.unwrap_err();
        assert_eq!(missing.reason, "not found");

        let broken = fetch_image(&store, "broken.png").await.unwrap_err();
        assert_eq!(broken.key, "broken.png");
    }

    #[tokio::test]
    async fn test_fetch_prompt() {
        let store = MemoryObjectStore::new();
        store.insert("p.txt", b"red dress\n".to_vec());
        assert_eq!(fetch_prompt(&store, "p.txt").await.as_deref(), Some("red dress"));
        assert!(fetch_prompt(&store, "q.txt").await.is_none());
    }
}
