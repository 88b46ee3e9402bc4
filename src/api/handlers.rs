//! Request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn, Span};
use uuid::Uuid;

use crate::admission::{ClientIdentity, Decision};
use crate::error::{AppError, Result};
use crate::provider::{GenerationRequest, ReferenceImage};
use crate::response::{base64, GenerateResponse};
use crate::AppState;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Body of `POST /generate`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequestBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<ImageInput>>,
}

/// Inline reference image
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    /// Base64 payload, optionally data-URL prefixed
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ImageInput {
    fn decode(&self) -> Result<ReferenceImage> {
        let mime_type = self
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .or_else(|| base64::mime_from_data_url(&self.data))
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();

        Ok(ReferenceImage {
            data: base64::decode(&self.data)?,
            mime_type,
        })
    }
}

/// `POST /generate`
///
/// Credential and input checks run before admission, so malformed requests
/// never consume a client's rate window.
#[tracing::instrument(skip_all, fields(request_id = %Uuid::new_v4(), client = tracing::field::Empty))]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<GenerateRequestBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let Json(body) = payload.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;

    let provider = state.provider.clone().ok_or_else(|| {
        AppError::Configuration(format!(
            "{} API key not configured",
            state.provider_kind.display_name()
        ))
    })?;

    let prompt = body.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(AppError::InvalidRequest("Prompt is required".to_string()));
    }

    let images = body
        .images
        .unwrap_or_default()
        .iter()
        .map(ImageInput::decode)
        .collect::<Result<Vec<_>>>()?;

    let identity = ClientIdentity::from_headers(&headers);
    Span::current().record("client", identity.as_str());

    // Held until the provider call finishes or this future is dropped
    let _permit = match &state.admission {
        Some(admission) => match admission.admit(&identity) {
            Decision::Admitted(permit) => Some(permit),
            Decision::Rejected(rejection) => {
                warn!(
                    reason = ?rejection.reason,
                    retry_after_secs = rejection.retry_after_secs(),
                    "Request throttled"
                );
                return Err(AppError::RateLimited {
                    retry_after_secs: rejection.retry_after_secs(),
                });
            }
        },
        None => None,
    };

    info!(
        provider = provider.name(),
        references = images.len(),
        "Forwarding generation request"
    );

    let request = GenerationRequest { prompt, images };
    let result = match tokio::time::timeout(state.provider_timeout, provider.generate(request)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(provider = provider.name(), error = %e, "Generation failed");
            return Err(e);
        }
        Err(_) => {
            error!(provider = provider.name(), "Generation timed out");
            return Err(AppError::Timeout(format!(
                "Generation timed out after {}s",
                state.provider_timeout.as_secs()
            )));
        }
    };

    let response = GenerateResponse::from(result);
    info!(
        images = response.images.len(),
        text_len = response.text.len(),
        "Generation complete"
    );
    Ok(Json(response))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "provider": state.provider_kind.display_name(),
        "provider_configured": state.provider.is_some(),
        "tracked_clients": state.admission.as_ref().map_or(0, |a| a.tracked_clients()),
    }))
}
