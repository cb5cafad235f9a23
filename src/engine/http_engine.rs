//! Synthesis engine client for a model worker reachable over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{self, base64, Bitmap};
use crate::config::EngineConfig;
use crate::engine::traits::{EngineCall, EngineOutput, ImageInput, SynthesisEngine};
use crate::error::{AppError, Result};

/// Engine backed by a model worker process.
///
/// The worker hosts the loaded pipeline; this client only marshals calls.
pub struct HttpEngine {
    name: String,
    client: Client,
    endpoint: String,
    model_dir: String,
    device: String,
    load_poll_interval: Duration,
    load_max_attempts: u32,
}

#[derive(Debug, Serialize)]
struct ApiLoadRequest<'a> {
    model_dir: &'a str,
    device: &'a str,
    torch_dtype: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiImage {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Serialize)]
struct ApiEditRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    image: ApiImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_image: Option<String>,
    width: u32,
    height: u32,
    num_images_per_prompt: u32,
    num_inference_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance_scale: Option<f32>,
    true_cfg_scale: f32,
    output_type: String,
    max_sequence_length: u32,
}

#[derive(Debug, Deserialize)]
struct ApiEditResponse {
    #[serde(default)]
    images: Vec<String>,
}

impl HttpEngine {
    /// Create a new HTTP engine from configuration
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("http:{}", config.endpoint),
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_dir: config.model_dir.clone(),
            device: config.device.clone(),
            load_poll_interval: Duration::from_secs(config.load_poll_interval_secs),
            load_max_attempts: config.load_max_attempts.max(1),
        })
    }

    async fn worker_is_up(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(engine = %self.name, status = %response.status(), "Worker not up yet");
                false
            }
            Err(e) => {
                debug!(engine = %self.name, error = %e, "Worker not reachable yet");
                false
            }
        }
    }

    fn encode_image(image: &Bitmap) -> Result<String> {
        codec::encode(image)
    }

    fn to_api_request(call: EngineCall) -> Result<ApiEditRequest> {
        let image = match &call.image {
            ImageInput::Single(image) => ApiImage::Single(Self::encode_image(image)?),
            ImageInput::Batch(images) => ApiImage::Batch(
                images
                    .iter()
                    .map(Self::encode_image)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let mask_image = call.mask.as_ref().map(Self::encode_image).transpose()?;

        Ok(ApiEditRequest {
            prompt: call.prompt,
            negative_prompt: call.negative_prompt,
            image,
            mask_image,
            width: call.width,
            height: call.height,
            num_images_per_prompt: call.num_images_per_prompt,
            num_inference_steps: call.num_inference_steps,
            guidance_scale: call.guidance_scale,
            true_cfg_scale: call.true_cfg_scale,
            output_type: call.output_type.as_str().to_string(),
            max_sequence_length: call.max_sequence_length,
        })
    }
}

#[async_trait]
impl SynthesisEngine for HttpEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self) -> Result<()> {
        let mut attempt = 0;
        while !self.worker_is_up().await {
            attempt += 1;
            if attempt >= self.load_max_attempts {
                return Err(AppError::Engine(format!(
                    "engine worker at {} did not come up after {} attempts",
                    self.endpoint, attempt
                )));
            }
            tokio::time::sleep(self.load_poll_interval).await;
        }

        info!(
            engine = %self.name,
            model_dir = %self.model_dir,
            device = %self.device,
            "Loading model"
        );

        let url = format!("{}/load", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&ApiLoadRequest {
                model_dir: &self.model_dir,
                device: &self.device,
                torch_dtype: "float16",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(engine = %self.name, status = %status, body = %body, "Model load rejected");
            return Err(AppError::Engine(format!("model load failed with status {}", status)));
        }

        info!(engine = %self.name, "Model loaded");
        Ok(())
    }

    async fn edit(&mut self, call: EngineCall) -> Result<EngineOutput> {
        let api_request = Self::to_api_request(call)?;
        let url = format!("{}/edit", self.endpoint);

        debug!(engine = %self.name, url = %url, "Sending edit request");

        let response = self.client.post(&url).json(&api_request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(engine = %self.name, status = %status, body = %body, "Engine returned error");
            return Err(AppError::Engine(format!("engine returned status {}", status)));
        }

        let api_response: ApiEditResponse = response
            .json()
            .await
            .map_err(|e| AppError::Engine(format!("failed to parse engine response: {}", e)))?;

        let images = api_response
            .images
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                let bytes = base64::decode(payload)?;
                codec::decode(&bytes).map_err(|e| {
                    AppError::Engine(format!("engine output {} is not an image: {}", index, e))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                AppError::InvalidInput(message) => AppError::Engine(message),
                other => other,
            })?;

        Ok(EngineOutput { images })
    }
}
