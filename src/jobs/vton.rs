//! Virtual try-on job: dress an edited person image in a randomly drawn garment

use super::{fetch_image, fetch_prompt, Job};
use crate::config::KeyLayout;
use crate::filter::WorkFilter;
use crate::generation::GenerationRequest;
use crate::keys::{self, ArtifactKind, Group, WorkItem};
use crate::manifest::ManifestEntry;
use crate::pipeline::{Artifact, AuxiliaryInput, MissingInput, WorkPackage};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};

/// Prompt used when a garment has no usable description
pub const DEFAULT_VTON_PROMPT: &str = "A person wearing this cloth";
/// Inference steps for try-on generations
pub const VTON_STEPS: u32 = 20;

/// Edited images under `{output_root}` become try-on triplets under `{ultimate_root}`
#[derive(Debug)]
pub struct VtonJob {
    layout: KeyLayout,
    /// Garment image keys per group, sorted
    clothes: HashMap<Group, Vec<String>>,
    rng: Mutex<StdRng>,
}

impl VtonJob {
    /// Build a job from an explicit garment catalogue
    pub fn new(layout: KeyLayout, clothes: HashMap<Group, Vec<String>>, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let clothes = clothes
            .into_iter()
            .map(|(group, mut keys)| {
                keys.sort_unstable();
                (group, keys)
            })
            .collect();
        Self {
            layout,
            clothes,
            rng: Mutex::new(rng),
        }
    }

    /// List the garment catalogue of every group the filter admits.
    ///
    /// A group whose listing fails ends up with no garments, so its items
    /// are skipped.
    #[instrument(skip_all, fields(filter = %filter))]
    pub async fn load(
        store: &dyn ObjectStore,
        layout: KeyLayout,
        filter: &WorkFilter,
        seed: Option<u64>,
    ) -> Self {
        let mut clothes = HashMap::new();
        for group in filter.groups() {
            let prefix = keys::clothes_images_prefix(&layout, group);
            let listed = match store.list(&prefix).await {
                Ok(found) => found
                    .into_iter()
                    .filter(|key| keys::is_cloth_image(key))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "⚠️  Could not list clothes");
                    Vec::new()
                },
            };
            info!(group = %group, count = listed.len(), "👕 Clothes catalogue loaded");
            clothes.insert(group, listed);
        }
        Self::new(layout, clothes, seed)
    }

    pub fn clothes_for(&self, group: Group) -> &[String] {
        self.clothes.get(&group).map_or(&[], Vec::as_slice)
    }

    fn choose_cloth(&self, group: Group) -> Option<String> {
        let catalogue = self.clothes_for(group);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        catalogue.choose(&mut *rng).cloned()
    }

    fn artifact_key(&self, item: &WorkItem, kind: ArtifactKind) -> String {
        keys::vton_artifact_key(&self.layout, item, kind)
    }
}

#[async_trait]
impl Job for VtonJob {
    fn name(&self) -> &'static str {
        "vton"
    }

    fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    fn source_extension(&self) -> &'static str {
        "png"
    }

    fn candidate_prefixes(&self, filter: &WorkFilter) -> Vec<String> {
        filter.scan_prefixes(&self.layout.output_root, |group| group.to_string(), "")
    }

    fn resume_prefixes(&self, filter: &WorkFilter) -> Vec<String> {
        filter.scan_prefixes(
            &self.layout.ultimate_root,
            |group| group.to_string(),
            ArtifactKind::TryOn.dir_name(),
        )
    }

    fn parse(&self, key: &str) -> Option<WorkItem> {
        keys::parse_edited_image_key(&self.layout, key)
    }

    fn target_key(&self, item: &WorkItem) -> String {
        self.artifact_key(item, ArtifactKind::TryOn)
    }

    async fn fetch(
        &self,
        store: &dyn ObjectStore,
        item: WorkItem,
        target_key: String,
    ) -> Result<WorkPackage, MissingInput> {
        let cloth_key = self
            .choose_cloth(item.group)
            .ok_or_else(|| MissingInput::new(&item.source_key, format!("no clothes for group {}", item.group)))?;
        let prompt_key = keys::cloth_prompt_key(&cloth_key);

        let (person, cloth, prompt) = tokio::join!(
            fetch_image(store, &item.source_key),
            fetch_image(store, &cloth_key),
            async {
                match &prompt_key {
                    Some(key) => fetch_prompt(store, key).await,
                    None => None,
                }
            }
        );

        let primary = person?;
        let cloth = cloth?;
        let prompt = prompt.unwrap_or_else(|| {
            warn!(
                cloth = %cloth_key,
                "Cloth prompt missing, using default prompt"
            );
            DEFAULT_VTON_PROMPT.to_string()
        });

        Ok(WorkPackage {
            item,
            target_key,
            primary,
            auxiliary: vec![AuxiliaryInput {
                key: cloth_key,
                image: cloth,
            }],
            prompt,
        })
    }

    fn request(&self, package: &WorkPackage) -> GenerationRequest {
        let mut request = GenerationRequest::new(
            package.prompt.clone(),
            package.primary.width(),
            package.primary.height(),
        )
        .with_image(Arc::clone(&package.primary))
        .with_steps(VTON_STEPS);
        for input in &package.auxiliary {
            request = request.with_reference(Arc::clone(&input.image));
        }
        request
    }

    fn artifacts(&self, package: &WorkPackage, output: DynamicImage) -> Vec<Artifact> {
        let mut artifacts = vec![
            Artifact {
                key: package.target_key.clone(),
                image: Arc::new(output),
            },
            Artifact {
                key: self.artifact_key(&package.item, ArtifactKind::Initial),
                image: Arc::clone(&package.primary),
            },
        ];
        if let Some(cloth) = package.auxiliary.first() {
            artifacts.push(Artifact {
                key: self.artifact_key(&package.item, ArtifactKind::Cloth),
                image: Arc::clone(&cloth.image),
            });
        }
        artifacts
    }

    fn manifest_entry(&self, store: &dyn ObjectStore, package: &WorkPackage) -> Option<ManifestEntry> {
        Some(ManifestEntry {
            initial_image: store.uri(&self.artifact_key(&package.item, ArtifactKind::Initial)),
            cloth_image: store.uri(&self.artifact_key(&package.item, ArtifactKind::Cloth)),
            try_on_image: store.uri(&package.target_key),
        })
    }

    fn manifest_key(&self, filter: &WorkFilter) -> Option<String> {
        Some(keys::join_key(
            &self.layout.ultimate_root,
            &format!("{}.jsonl", filter.label()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Category;
    use crate::services::ImageCodec;
    use crate::storage::MemoryObjectStore;
    use image::RgbImage;

    const PERSON_KEY: &str = "edited_images/easy/female/1044_partition_0_3_edit.png";

    fn png(width: u32, height: u32) -> Vec<u8> {
        ImageCodec::encode_png(&DynamicImage::ImageRgb8(RgbImage::new(width, height))).unwrap()
    }

    fn seeded_store() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.insert(PERSON_KEY, png(8, 12));
        store.insert("dataset/clothes/female/images/7.jpg", png(4, 4));
        store.insert("dataset/clothes/female/images/readme.md", b"x".to_vec());
        store.insert("dataset/clothes/female/prompts/7.txt", b"a green linen dress".to_vec());
        store
    }

    #[tokio::test]
    async fn test_load_lists_clothes_per_group() {
        let store = seeded_store();
        let filter = WorkFilter::new().with_group(Group::Female);
        let job = VtonJob::load(&store, KeyLayout::default(), &filter, Some(1)).await;
        assert_eq!(job.clothes_for(Group::Female), ["dataset/clothes/female/images/7.jpg"]);
        assert!(job.clothes_for(Group::Male).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_artifacts() {
        let store = seeded_store();
        let job = VtonJob::load(&store, KeyLayout::default(), &WorkFilter::new(), Some(3)).await;
        let item = job.parse(PERSON_KEY).unwrap();
        let target = job.target_key(&item);
        assert_eq!(
            target,
            "dataset_ultimate/easy/female/try_on_image/1044_partition_0_3_edit_try_on.png"
        );

        let package = job.fetch(&store, item, target).await.unwrap();
        assert_eq!(package.prompt, "a green linen dress");
        assert_eq!(package.auxiliary.len(), 1);

        let request = job.request(&package);
        assert_eq!(request.steps, Some(VTON_STEPS));
        assert_eq!(request.references.len(), 1);
        assert_eq!((request.width, request.height), (8, 12));

        let output = DynamicImage::ImageRgb8(RgbImage::new(8, 12));
        let keys: Vec<String> = job
            .artifacts(&package, output)
            .into_iter()
            .map(|a| a.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "dataset_ultimate/easy/female/try_on_image/1044_partition_0_3_edit_try_on.png",
                "dataset_ultimate/easy/female/initial_image/1044_partition_0_3_edit_initial.png",
                "dataset_ultimate/easy/female/cloth_image/1044_partition_0_3_edit_cloth.png",
            ]
        );

        let entry = job.manifest_entry(&store, &package).unwrap();
        assert_eq!(
            entry.try_on_image,
            "s3://memory/dataset_ultimate/easy/female/try_on_image/1044_partition_0_3_edit_try_on.png"
        );
    }

    #[tokio::test]
    async fn test_missing_prompt_falls_back_to_default() {
        let store = MemoryObjectStore::new();
        store.insert(PERSON_KEY, png(2, 2));
        store.insert("dataset/clothes/female/images/9.png", png(2, 2));
        let job = VtonJob::load(&store, KeyLayout::default(), &WorkFilter::new(), Some(0)).await;

        let item = job.parse(PERSON_KEY).unwrap();
        let package = job.fetch(&store, item, "t".to_string()).await.unwrap();
        assert_eq!(package.prompt, DEFAULT_VTON_PROMPT);
    }

    #[tokio::test]
    async fn test_no_clothes_or_missing_person_skips() {
        let store = MemoryObjectStore::new();
        store.insert(PERSON_KEY, png(2, 2));
        let job = VtonJob::load(&store, KeyLayout::default(), &WorkFilter::new(), Some(0)).await;
        let item = job.parse(PERSON_KEY).unwrap();
        let missing = job.fetch(&store, item, "t".to_string()).await.unwrap_err();
        assert!(missing.reason.contains("no clothes"));

        let store = seeded_store();
        let job = VtonJob::load(&store, KeyLayout::default(), &WorkFilter::new(), Some(0)).await;
        let item = job
            .parse("edited_images/easy/female/55_partition_0_1.png")
            .unwrap();
        let missing = job.fetch(&store, item, "t".to_string()).await.unwrap_err();
        assert_eq!(missing.key, "edited_images/easy/female/55_partition_0_1.png");
    }

    #[test]
    fn test_seeded_choice_is_reproducible() {
        let clothes: Vec<String> = (0..50).map(|i| format!("c/female/images/{i}.png")).collect();
        let catalogue = HashMap::from([(Group::Female, clothes)]);

        let first = VtonJob::new(KeyLayout::default(), catalogue.clone(), Some(42));
        let second = VtonJob::new(KeyLayout::default(), catalogue, Some(42));
        let a: Vec<_> = (0..5).map(|_| first.choose_cloth(Group::Female)).collect();
        let b: Vec<_> = (0..5).map(|_| second.choose_cloth(Group::Female)).collect();
        assert_eq!(a, b);
        assert!(first.choose_cloth(Group::Male).is_none());
    }

    #[test]
    fn test_prefixes_and_manifest_key() {
        let job = VtonJob::new(KeyLayout::default(), HashMap::new(), Some(0));
        let filter = WorkFilter::new()
            .with_category(Category::Easy)
            .with_group(Group::Female)
            .with_partition("partition_0");
        assert_eq!(job.candidate_prefixes(&filter), vec!["edited_images/easy/female/"]);
        assert_eq!(
            job.resume_prefixes(&filter),
            vec!["dataset_ultimate/easy/female/try_on_image/"]
        );
        assert_eq!(
            job.manifest_key(&filter).as_deref(),
            Some("dataset_ultimate/easy_female_partition_0.jsonl")
        );
    }
}
