//! Gemini `generateContent` client for mixed text and image output

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::provider::{
    provider_error_message, GeneratedImage, GenerationProvider, GenerationRequest,
    GenerationResult,
};
use crate::response::base64;

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

/// Variant order matters for untagged decoding
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url(),
            model: config.model(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(request: GenerationRequest) -> GenerateContentRequest {
        let mut parts: Vec<Part> = request
            .images
            .into_iter()
            .map(|image| Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: base64::encode(&image.data),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: request.prompt,
        });

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        }
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult> {
        debug!(
            model = %self.model,
            references = request.images.len(),
            "Sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(status = %status, "Gemini API error: {}", body);
            return Err(AppError::Provider(provider_error_message(status, &body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AppError::Provider(format!("Failed to parse Gemini response: {}", e))
        })?;

        let mut result = GenerationResult::default();
        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default();

        for part in parts {
            match part {
                Part::Text { text } => result.text.push_str(&text),
                Part::InlineData { inline_data } => result.images.push(GeneratedImage {
                    mime_type: inline_data.mime_type,
                    b64_data: inline_data.data,
                }),
                Part::Other(_) => {}
            }
        }

        Ok(result)
    }
}
