//! Response shaping - converts provider output into the `/generate` payload

pub mod base64;

use serde::{Deserialize, Serialize};

use crate::provider::GenerationResult;

/// Success body for `POST /generate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub text: String,
    /// Generated images as data URLs
    pub images: Vec<String>,
    pub has_images: bool,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        let images: Vec<String> = result.images.iter().map(|image| image.to_data_url()).collect();

        Self {
            text: result.text,
            has_images: !images.is_empty(),
            images,
        }
    }
}
