//! Reading the edit form out of a multipart body

use axum::extract::Multipart;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::validation::RawEditFields;

/// Collect all recognized fields. Unknown fields are skipped.
///
/// `images`, `images[]`, `image` and `image[]` all append to the image list
/// in the order they appear in the body.
pub async fn read_edit_fields(mut multipart: Multipart) -> Result<RawEditFields> {
    let mut raw = RawEditFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "images" | "images[]" | "image" | "image[]" => {
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read '{}' upload: {}", name, e))
                })?;
                raw.images.push(bytes.to_vec());
            }
            "mask" => {
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read 'mask' upload: {}", e))
                })?;
                raw.mask = Some(bytes.to_vec());
            }
            "prompt" | "negative_prompt" | "size" | "n" | "num_inference_steps"
            | "guidance_scale" | "true_cfg_scale" | "output_type" | "max_sequence_length" => {
                let text = field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Invalid '{}' field: {}", name, e))
                })?;
                let slot = match name.as_str() {
                    "prompt" => &mut raw.prompt,
                    "negative_prompt" => &mut raw.negative_prompt,
                    "size" => &mut raw.size,
                    "n" => &mut raw.n,
                    "num_inference_steps" => &mut raw.num_inference_steps,
                    "guidance_scale" => &mut raw.guidance_scale,
                    "true_cfg_scale" => &mut raw.true_cfg_scale,
                    "output_type" => &mut raw.output_type,
                    _ => &mut raw.max_sequence_length,
                };
                *slot = Some(text);
            }
            other => {
                debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    Ok(raw)
}
