//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;
use vton_forge::{
    GenerationBackend, ImageCodec, MemoryObjectStore, MockGenerationBackend, Pipeline,
    PipelineConfig,
};

/// Encode a solid test image as PNG bytes
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    ImageCodec::encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
}

/// Mock backend that is already initialized
pub fn ready_backend() -> MockGenerationBackend {
    let mut backend = MockGenerationBackend::new();
    backend.initialize().unwrap();
    backend
}

pub fn pipeline(store: &MemoryObjectStore, backend: &MockGenerationBackend, config: PipelineConfig) -> Pipeline {
    Pipeline::new(Arc::new(store.clone()), Arc::new(backend.clone()), config)
}

/// Seed one edit work item: its prompt and its source person image.
/// Returns the prompt key.
pub fn seed_edit_item(
    store: &MemoryObjectStore,
    category: &str,
    group: &str,
    partition: &str,
    stem: &str,
    prompt: &str,
) -> String {
    let subject = stem.split('_').next().unwrap();
    let prompt_key = format!("dataset/edit_prompts/{category}/edit_{group}/{partition}/{stem}.txt");
    store.insert(prompt_key.clone(), prompt.as_bytes().to_vec());
    store.insert(
        format!("dataset/{group}/{group}/images/{subject}.png"),
        png_bytes(12, 16),
    );
    prompt_key
}

/// Seed one edited image, the input of the try-on job. Returns its key.
pub fn seed_edited_image(store: &MemoryObjectStore, category: &str, group: &str, stem: &str) -> String {
    let key = format!("edited_images/{category}/{group}/{stem}.png");
    store.insert(key.clone(), png_bytes(10, 14));
    key
}

/// Seed one garment image and, optionally, its prompt
pub fn seed_cloth(store: &MemoryObjectStore, group: &str, file: &str, prompt: Option<&str>) {
    store.insert(format!("dataset/clothes/{group}/images/{file}"), png_bytes(6, 6));
    if let Some(prompt) = prompt {
        let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
        store.insert(
            format!("dataset/clothes/{group}/prompts/{stem}.txt"),
            prompt.as_bytes().to_vec(),
        );
    }
}
