//! Base64 transport encoding for image payloads

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 string to binary data.
///
/// Accepts both bare payloads and `data:image/...;base64,` URLs.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = strip_data_url(encoded);

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid base64 data: {}", e)))
}

fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    }
}
