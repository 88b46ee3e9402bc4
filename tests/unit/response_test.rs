//! Unit tests for response shaping and base64 helpers

use imagechat_gateway::provider::{GeneratedImage, GenerationResult};
use imagechat_gateway::response::{base64, GenerateResponse};

#[test]
fn test_base64_decode_data_url() {
    let data_url = "data:image/png;base64,SGVsbG8sIFdvcmxkIQ==";
    let decoded = base64::decode(data_url).unwrap();

    assert_eq!(b"Hello, World!", decoded.as_slice());
}

#[test]
fn test_base64_rejects_garbage() {
    assert!(base64::decode("not valid base64!!!").is_err());
}

#[test]
fn test_data_url_round_trip() {
    let encoded = base64::encode(b"test data");
    let url = base64::data_url("image/webp", &encoded);

    assert!(url.starts_with("data:image/webp;base64,"));
    assert_eq!(base64::mime_from_data_url(&url), Some("image/webp"));
    assert_eq!(base64::decode(&url).unwrap(), b"test data");
}

#[test]
fn test_generate_response_shape() {
    let response = GenerateResponse::from(GenerationResult {
        text: "A small boat.".to_string(),
        images: vec![GeneratedImage::png("Ym9hdA==")],
    });

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "text": "A small boat.",
            "images": ["data:image/png;base64,Ym9hdA=="],
            "hasImages": true
        })
    );
}

#[test]
fn test_generate_response_without_images() {
    let response = GenerateResponse::from(GenerationResult::default());

    assert!(!response.has_images);
    assert!(response.images.is_empty());
    assert_eq!(response.text, "");
}
