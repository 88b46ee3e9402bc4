//! OpenAI image generation client

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::provider::{
    provider_error_message, GeneratedImage, GenerationProvider, GenerationRequest,
    GenerationResult,
};

const GENERATIONS_PATH: &str = "/v1/images/generations";
const EDITS_PATH: &str = "/v1/images/edits";
const DEFAULT_MIME: &str = "image/png";

/// Calls `images.generate`, or `images.edit` when reference images are supplied
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    size: String,
    quality: String,
}

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    quality: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        // Bounded by the handler's timeout; no client-level timeout here
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url(),
            model: config.model(),
            size: config.image_size.clone(),
            quality: config.image_quality.clone(),
        })
    }

    async fn generate_from_prompt(&self, prompt: &str) -> Result<reqwest::Response> {
        let body = ImageGenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
            quality: &self.quality,
        };

        Ok(self
            .client
            .post(format!("{}{}", self.base_url, GENERATIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?)
    }

    async fn edit_with_references(&self, request: &GenerationRequest) -> Result<reqwest::Response> {
        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", request.prompt.clone())
            .text("n", "1")
            .text("size", self.size.clone())
            .text("quality", self.quality.clone());

        for image in &request.images {
            let mime = if image.mime_type.is_empty() {
                DEFAULT_MIME
            } else {
                image.mime_type.as_str()
            };
            let part = multipart::Part::bytes(image.data.clone())
                .file_name("image.png")
                .mime_str(mime)
                .map_err(|e| AppError::InvalidRequest(format!("Invalid image media type '{}': {}", mime, e)))?;
            form = form.part("image[]", part);
        }

        Ok(self
            .client
            .post(format!("{}{}", self.base_url, EDITS_PATH))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult> {
        debug!(
            model = %self.model,
            references = request.images.len(),
            "Sending OpenAI image request"
        );

        let response = if request.images.is_empty() {
            self.generate_from_prompt(&request.prompt).await?
        } else {
            self.edit_with_references(&request).await?
        };

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(status = %status, "OpenAI API error: {}", body);
            return Err(AppError::Provider(provider_error_message(status, &body)));
        }

        let parsed: ImageGenerationResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            AppError::Provider(format!("Failed to parse OpenAI response: {}", e))
        })?;

        // Only the first image is used, matching n = 1
        let images = parsed
            .data
            .into_iter()
            .next()
            .and_then(|image| image.b64_json)
            .map(GeneratedImage::png)
            .into_iter()
            .collect();

        Ok(GenerationResult {
            text: String::new(),
            images,
        })
    }
}
