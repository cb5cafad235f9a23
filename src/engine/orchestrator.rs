//! Edit orchestration: one validated request in, one engine call, encoded results out

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec;
use crate::engine::traits::{EngineCall, ImageInput, SynthesisEngine};
use crate::error::{AppError, Result};
use crate::validation::EditRequest;

/// Outcome of a completed edit
#[derive(Debug, Clone)]
pub struct EditResult {
    /// Unix timestamp, seconds
    pub created: i64,
    /// Base64 PNG payloads in (input index, variant index) order
    pub images: Vec<String>,
    /// Wall-clock time from dequeue to completion
    pub processing_time: Duration,
    pub input_images: usize,
    pub generated_images: usize,
}

/// Assembles engine calls and unpacks their output
#[derive(Debug, Clone, Copy, Default)]
pub struct EditOrchestrator;

impl EditOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Build the engine call for a request
    pub fn build_call(&self, request: EditRequest) -> EngineCall {
        EngineCall {
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            image: ImageInput::from_images(request.images),
            mask: request.mask,
            width: request.width,
            height: request.height,
            num_images_per_prompt: request.n,
            num_inference_steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            true_cfg_scale: request.true_cfg_scale,
            output_type: request.output_type,
            max_sequence_length: request.max_sequence_length,
        }
    }

    /// Run one request against the engine.
    ///
    /// Any engine failure comes back as [`AppError::Engine`]; the caller's
    /// worker loop keeps going either way.
    pub async fn execute(
        &self,
        engine: &mut dyn SynthesisEngine,
        request: EditRequest,
    ) -> Result<EditResult> {
        let input_images = request.images.len();
        let expected = request.expected_outputs();
        let call = self.build_call(request);
        let engine_name = engine.name().to_string();

        debug!(
            engine = %engine_name,
            input_images = input_images,
            variants = call.num_images_per_prompt,
            "Invoking engine"
        );

        let output = engine.edit(call).await.map_err(|e| {
            warn!(engine = %engine_name, error = %e, "Engine call failed");
            AppError::Engine(sanitize(&e))
        })?;

        if output.images.len() != expected {
            warn!(
                expected = expected,
                actual = output.images.len(),
                "Engine returned unexpected number of images"
            );
            return Err(AppError::Engine(format!(
                "engine returned {} images, expected {}",
                output.images.len(),
                expected
            )));
        }

        let images = output
            .images
            .iter()
            .map(codec::encode)
            .collect::<Result<Vec<_>>>()?;

        Ok(EditResult {
            created: Utc::now().timestamp(),
            generated_images: images.len(),
            images,
            processing_time: Duration::ZERO,
            input_images,
        })
    }
}

/// Summary of an engine failure that is safe to return to callers
fn sanitize(error: &AppError) -> String {
    match error {
        AppError::Engine(message) => message.clone(),
        AppError::HttpClient(e) if e.is_timeout() => "engine call timed out".to_string(),
        AppError::HttpClient(_) => "engine is unreachable".to_string(),
        AppError::InvalidInput(message) => message.clone(),
        _ => "engine call failed".to_string(),
    }
}
