//! Generation backend that calls a remote inference service over HTTP
//!
//! The service exposes `GET {endpoint}/health` and
//! `POST {endpoint}/v1/generate`. A generate call is a multipart form with a
//! `parameters` JSON part and PNG parts `image` and `reference_{n}`; the
//! response body is the PNG result.

use crate::{
    config::BackendConfig,
    error::{ForgeError, Result},
    generation::{GenerationBackend, GenerationRequest, ModelVariant},
    services::ImageCodec,
};
use image::DynamicImage;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// JSON parameters sent with every generate call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationParameters {
    pub model: String,
    pub model_id: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    pub reference_count: usize,
}

impl GenerationParameters {
    /// Resolve a request against the variant defaults
    pub fn from_request(request: &GenerationRequest, variant: ModelVariant) -> Self {
        Self {
            model: variant.name().to_string(),
            model_id: variant.model_id().to_string(),
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            steps: request.resolved_steps(variant),
            guidance: request.resolved_guidance(variant),
            strength: request.strength,
            reference_count: request.references.len(),
        }
    }
}

/// HTTP client for the generation service.
///
/// Generation is synchronous from the caller's view: each call drives the
/// async request to completion on the captured runtime handle, so it must
/// run on a blocking thread (`spawn_blocking`), never on an async worker.
#[derive(Debug)]
pub struct HttpGenerationBackend {
    config: BackendConfig,
    client: Client,
    runtime: tokio::runtime::Handle,
    initialized: bool,
}

impl HttpGenerationBackend {
    /// Create a backend bound to the current tokio runtime
    ///
    /// # Errors
    /// - Called outside a tokio runtime
    /// - HTTP client construction failures
    pub fn new(config: BackendConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ForgeError::invalid_config(format!("HTTP backend needs a tokio runtime: {e}"))
        })?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vton-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForgeError::generation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            runtime,
            initialized: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.endpoint.trim_end_matches('/'))
    }

    fn generate_url(&self) -> String {
        format!("{}/v1/generate", self.config.endpoint.trim_end_matches('/'))
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| ForgeError::generation_with_endpoint(&self.config.endpoint, "Health check", e))?;

        if !response.status().is_success() {
            return Err(ForgeError::generation_with_endpoint(
                &self.config.endpoint,
                "Health check",
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(())
    }

    fn build_form(&self, request: &GenerationRequest) -> Result<Form> {
        let parameters = GenerationParameters::from_request(request, self.config.variant);
        let mut form = Form::new().text("parameters", serde_json::to_string(&parameters)?);

        if let Some(image) = &request.image {
            form = form.part("image", png_part(image, "image.png")?);
        }
        for (index, reference) in request.references.iter().enumerate() {
            form = form.part(
                format!("reference_{index}"),
                png_part(reference, &format!("reference_{index}.png"))?,
            );
        }
        Ok(form)
    }

    async fn send(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        let form = self.build_form(request)?;
        let response = self
            .client
            .post(self.generate_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ForgeError::generation_with_endpoint(&self.config.endpoint, "Generate", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ForgeError::generation_with_endpoint(
                &self.config.endpoint,
                "Generate",
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ForgeError::generation_with_endpoint(&self.config.endpoint, "Read result", e))?;
        ImageCodec::decode(&body)
    }
}

fn png_part(image: &DynamicImage, file_name: &str) -> Result<Part> {
    Part::bytes(ImageCodec::encode_png(image)?)
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .map_err(|e| ForgeError::internal(format!("Invalid multipart mime type: {e}")))
}

impl GenerationBackend for HttpGenerationBackend {
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint, model = %self.config.variant))]
    fn initialize(&mut self) -> Result<Option<Duration>> {
        let started = Instant::now();
        self.runtime.block_on(self.health_check())?;
        self.initialized = true;
        let elapsed = started.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "🔌 Generation service reachable");
        Ok(Some(elapsed))
    }

    fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        if !self.initialized {
            return Err(ForgeError::generation("HTTP backend not initialized"));
        }
        debug!(
            prompt = %request.prompt_preview(),
            width = request.width,
            height = request.height,
            references = request.references.len(),
            "Sending generation request"
        );
        self.runtime.block_on(self.send(request))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn variant(&self) -> ModelVariant {
        self.config.variant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    #[test]
    fn test_parameters_resolve_variant_defaults() {
        let request = GenerationRequest::new("a person wearing this cloth", 512, 768)
            .with_reference(Arc::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2))))
            .with_steps(20);
        let parameters = GenerationParameters::from_request(&request, ModelVariant::Nvfp4);

        assert_eq!(parameters.model, "nvfp4");
        assert_eq!(parameters.steps, 20);
        assert!((parameters.guidance - 4.0).abs() < f32::EPSILON);
        assert_eq!(parameters.reference_count, 1);
        assert!(parameters.strength.is_none());

        let json = serde_json::to_value(&parameters).unwrap();
        assert!(json.get("strength").is_none());
        assert_eq!(json["width"], 512);
    }

    #[tokio::test]
    async fn test_urls_and_uninitialized_generate() {
        let backend = HttpGenerationBackend::new(BackendConfig {
            endpoint: "http://gpu-box:8188/".to_string(),
            ..BackendConfig::default()
        })
        .unwrap();

        assert_eq!(backend.health_url(), "http://gpu-box:8188/health");
        assert_eq!(backend.generate_url(), "http://gpu-box:8188/v1/generate");
        assert!(!backend.is_initialized());
        assert!(backend
            .generate(&GenerationRequest::new("p", 1, 1))
            .is_err());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = HttpGenerationBackend::new(BackendConfig::default()).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
    }
}
