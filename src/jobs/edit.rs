//! Edit job: apply a text edit prompt to a source person image

use super::{fetch_image, fetch_prompt, Job};
use crate::config::KeyLayout;
use crate::filter::WorkFilter;
use crate::generation::GenerationRequest;
use crate::keys::{self, WorkItem};
use crate::pipeline::{Artifact, MissingInput, WorkPackage};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

/// How far an edit may depart from the source image
pub const EDIT_STRENGTH: f32 = 0.75;

/// Prompts under `{edit_prompts_root}` become edited images under `{output_root}`
#[derive(Debug, Clone)]
pub struct EditJob {
    layout: KeyLayout,
    strength: f32,
}

impl EditJob {
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            layout,
            strength: EDIT_STRENGTH,
        }
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Job for EditJob {
    fn name(&self) -> &'static str {
        "edit"
    }

    fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    fn source_extension(&self) -> &'static str {
        "txt"
    }

    fn candidate_prefixes(&self, filter: &WorkFilter) -> Vec<String> {
        filter.scan_prefixes(
            &self.layout.edit_prompts_root,
            |group| keys::prompt_group_dir(&self.layout, group),
            "",
        )
    }

    fn resume_prefixes(&self, filter: &WorkFilter) -> Vec<String> {
        filter.scan_prefixes(&self.layout.output_root, |group| group.to_string(), "")
    }

    fn parse(&self, key: &str) -> Option<WorkItem> {
        keys::parse_edit_prompt_key(&self.layout, key)
    }

    fn target_key(&self, item: &WorkItem) -> String {
        keys::edit_target_key(&self.layout, item)
    }

    async fn fetch(
        &self,
        store: &dyn ObjectStore,
        item: WorkItem,
        target_key: String,
    ) -> Result<WorkPackage, MissingInput> {
        let image_key = keys::edit_source_image_key(&self.layout, &item);
        let (image, prompt) = tokio::join!(
            fetch_image(store, &image_key),
            fetch_prompt(store, &item.source_key)
        );

        let primary = image?;
        let prompt = prompt.ok_or_else(|| MissingInput::new(&item.source_key, "prompt is empty or missing"))?;

        Ok(WorkPackage {
            item,
            target_key,
            primary,
            auxiliary: Vec::new(),
            prompt,
        })
    }

    fn request(&self, package: &WorkPackage) -> GenerationRequest {
        GenerationRequest::new(
            package.prompt.clone(),
            package.primary.width(),
            package.primary.height(),
        )
        .with_image(Arc::clone(&package.primary))
        .with_strength(self.strength)
    }

    fn artifacts(&self, package: &WorkPackage, output: DynamicImage) -> Vec<Artifact> {
        vec![Artifact {
            key: package.target_key.clone(),
            image: Arc::new(output),
        }]
    }
}
