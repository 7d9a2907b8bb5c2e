//! Image generation backend abstraction

use crate::error::{ForgeError, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Diffusion model served by the generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelVariant {
    /// 4B weights quantized to NVFP4
    #[serde(rename = "nvfp4")]
    Nvfp4,
    #[serde(rename = "4b")]
    Klein4b,
    #[default]
    #[serde(rename = "9b")]
    Klein9b,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 3] = [ModelVariant::Nvfp4, ModelVariant::Klein4b, ModelVariant::Klein9b];

    /// Short name used on the command line and in job scripts
    pub fn name(self) -> &'static str {
        match self {
            ModelVariant::Nvfp4 => "nvfp4",
            ModelVariant::Klein4b => "4b",
            ModelVariant::Klein9b => "9b",
        }
    }

    /// Upstream model repository
    pub fn model_id(self) -> &'static str {
        match self {
            ModelVariant::Nvfp4 => "black-forest-labs/FLUX.2-klein-4b-nvfp4",
            ModelVariant::Klein4b => "black-forest-labs/FLUX.2-klein-4B",
            ModelVariant::Klein9b => "black-forest-labs/FLUX.2-klein-9B",
        }
    }

    /// Distilled models converge in four steps
    pub fn default_steps(self) -> u32 {
        4
    }

    pub fn default_guidance(self) -> f32 {
        match self {
            ModelVariant::Nvfp4 => 4.0,
            ModelVariant::Klein4b | ModelVariant::Klein9b => 1.0,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_ascii_lowercase();
        ModelVariant::ALL
            .into_iter()
            .find(|variant| variant.name() == lowered)
            .ok_or_else(|| ForgeError::config_value_error("model", s, "nvfp4, 4b, 9b"))
    }
}

/// One generation call: a prompt plus optional conditioning images
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Image to edit (person image for try-on)
    pub image: Option<Arc<DynamicImage>>,
    /// Additional reference images (the garment for try-on)
    pub references: Vec<Arc<DynamicImage>>,
    pub width: u32,
    pub height: u32,
    /// Inference steps; the variant default applies when unset
    pub steps: Option<u32>,
    /// Guidance scale; the variant default applies when unset
    pub guidance: Option<f32>,
    /// How far an edit may depart from `image`
    pub strength: Option<f32>,
}

impl GenerationRequest {
    pub fn new<S: Into<String>>(prompt: S, width: u32, height: u32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            references: Vec::new(),
            width,
            height,
            steps: None,
            guidance: None,
            strength: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: Arc<DynamicImage>) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn with_reference(mut self, image: Arc<DynamicImage>) -> Self {
        self.references.push(image);
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    #[must_use]
    pub fn with_guidance(mut self, guidance: f32) -> Self {
        self.guidance = Some(guidance);
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn resolved_steps(&self, variant: ModelVariant) -> u32 {
        self.steps.unwrap_or_else(|| variant.default_steps())
    }

    pub fn resolved_guidance(&self, variant: ModelVariant) -> f32 {
        self.guidance.unwrap_or_else(|| variant.default_guidance())
    }

    /// Short prompt preview for log lines
    pub fn prompt_preview(&self) -> String {
        const PREVIEW_CHARS: usize = 30;
        let mut preview: String = self.prompt.chars().take(PREVIEW_CHARS).collect();
        if self.prompt.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        preview
    }
}

/// Synchronous single-call image generation.
///
/// Calls are expensive and may hold exclusive hardware, so the pipeline runs
/// them on the blocking pool behind a counting gate.
pub trait GenerationBackend: Send + Sync {
    /// Prepare the backend (load weights, check the service)
    ///
    /// # Errors
    /// - Backend unreachable or misconfigured
    /// - Model loading failures
    fn initialize(&mut self) -> Result<Option<Duration>>;

    /// Produce one image
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Generation failures reported by the model or service
    fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Model variant this backend serves
    fn variant(&self) -> ModelVariant;
}
