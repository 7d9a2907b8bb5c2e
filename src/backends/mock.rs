//! Mock generation backend for testing pipeline behavior
//!
//! Records every call, can fail on selected prompts, can add artificial
//! latency and tracks how many generations ran at the same time.

use crate::{
    error::{ForgeError, Result},
    generation::{GenerationBackend, GenerationRequest, ModelVariant},
};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend; clones share call history and counters
#[derive(Debug, Clone)]
pub struct MockGenerationBackend {
    initialized: bool,
    variant: ModelVariant,
    /// Prompts in call order
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    /// Generation fails when the prompt contains any of these
    failing_prompts: Vec<String>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockGenerationBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            variant: ModelVariant::default(),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            failing_prompts: Vec::new(),
            latency: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Fail every generation whose prompt contains `pattern`
    #[must_use]
    pub fn failing_on<S: Into<String>>(mut self, pattern: S) -> Self {
        self.failing_prompts.push(pattern.into());
        self
    }

    /// Block each generation for `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Highest number of generations observed running at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, prompt: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(prompt.to_string());
        }
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GenerationBackend for MockGenerationBackend {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(ForgeError::generation("Mock backend initialization failed"));
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        if !self.initialized {
            return Err(ForgeError::generation("Mock backend not initialized"));
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.record_call(&request.prompt);

        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        if self
            .failing_prompts
            .iter()
            .any(|pattern| request.prompt.contains(pattern.as_str()))
        {
            return Err(ForgeError::generation(format!(
                "Mock generation failed for prompt '{}'",
                request.prompt_preview()
            )));
        }

        let shade = (request.prompt.len() % 256) as u8;
        let width = request.width.max(1);
        let height = request.height.max(1);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([shade, 128, 255 - shade]),
        )))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn variant(&self) -> ModelVariant {
        self.variant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_mock_requires_initialization() {
        let backend = MockGenerationBackend::new();
        assert!(!backend.is_initialized());
        let err = backend
            .generate(&GenerationRequest::new("p", 8, 8))
            .unwrap_err();
        assert!(matches!(err, ForgeError::Generation(_)));
    }

    #[test]
    fn test_mock_generates_requested_size() {
        let mut backend = MockGenerationBackend::new();
        backend.initialize().unwrap();
        let image = backend
            .generate(&GenerationRequest::new("make it blue", 16, 9))
            .unwrap();
        assert_eq!(image.dimensions(), (16, 9));
        assert_eq!(backend.get_call_history(), vec!["make it blue"]);
        assert_eq!(backend.max_concurrent_calls(), 1);
    }

    #[test]
    fn test_mock_failure_injection() {
        let mut backend = MockGenerationBackend::new().failing_on("explode");
        backend.initialize().unwrap();
        assert!(backend.generate(&GenerationRequest::new("please explode", 4, 4)).is_err());
        assert!(backend.generate(&GenerationRequest::new("fine", 4, 4)).is_ok());

        let mut failing = MockGenerationBackend::new_failing_init();
        assert!(failing.initialize().is_err());
    }

    #[test]
    fn test_clones_share_history() {
        let mut backend = MockGenerationBackend::new();
        backend.initialize().unwrap();
        let observer = backend.clone();
        backend.generate(&GenerationRequest::new("one", 2, 2)).unwrap();
        assert_eq!(observer.get_call_history(), vec!["one"]);
    }
}
