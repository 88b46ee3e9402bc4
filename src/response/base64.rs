//! Base64 and data URL helpers for inline images

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Strip a `data:<mime>;base64,` prefix if present
pub fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    }
}

/// Decode base64 (plain or data URL) to binary data
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(strip_data_url(encoded).trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid base64 image data: {}", e)))
}

/// Media type declared by a data URL, e.g. `image/png`
pub fn mime_from_data_url(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:")?;
    let end = rest.find(|c: char| c == ';' || c == ',')?;
    Some(&rest[..end]).filter(|mime| !mime.is_empty())
}

/// Wrap an already-encoded payload in a data URL
pub fn data_url(mime_type: &str, b64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, b64_data)
}
