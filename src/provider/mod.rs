//! Generation providers - request/response types, the provider trait, and clients

pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::Result;
use crate::response::base64;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Reference image supplied alongside the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Decoded image bytes
    pub data: Vec<u8>,
    /// Declared media type, e.g. `image/png`
    pub mime_type: String,
}

/// Prompt plus zero or more reference images
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<ReferenceImage>,
}

/// Image returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64 payload without a data URL prefix
    pub b64_data: String,
}

impl GeneratedImage {
    pub fn png(b64_data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            b64_data: b64_data.into(),
        }
    }

    pub fn to_data_url(&self) -> String {
        base64::data_url(&self.mime_type, &self.b64_data)
    }
}

/// Text and images produced for one request
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: String,
    pub images: Vec<GeneratedImage>,
}

/// Trait for prompt-to-image generation services
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Generate content for a prompt and optional reference images
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult>;
}

/// Build the configured provider, or `None` when no API key is available
pub fn build_provider(config: &ProviderConfig) -> Result<Option<Arc<dyn GenerationProvider>>> {
    let Some(api_key) = config.resolved_api_key() else {
        warn!(
            provider = config.kind.display_name(),
            env = config.kind.api_key_env(),
            "No API key configured; /generate will return configuration errors"
        );
        return Ok(None);
    };

    let provider: Arc<dyn GenerationProvider> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config, api_key)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config, api_key)?),
    };
    Ok(Some(provider))
}

/// Pull a human-readable message out of a provider error body.
///
/// Both OpenAI and Gemini wrap failures as `{"error": {"message": ...}}`.
pub(crate) fn provider_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Provider returned {}: {}", status, body))
}
