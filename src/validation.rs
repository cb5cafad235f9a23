//! Edit request validation
//!
//! Turns raw multipart fields into an [`EditRequest`]. Every rule has its own
//! failure message so callers can tell exactly which field was rejected.
//! Validation never touches the resource gate.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::codec::{self, Bitmap};
use crate::error::{AppError, Result};

pub const DEFAULT_SIZE: &str = "1024x1024";
pub const DEFAULT_N: u32 = 1;
pub const MAX_N: u32 = 10;
pub const DEFAULT_INFERENCE_STEPS: u32 = 50;
pub const DEFAULT_TRUE_CFG_SCALE: f32 = 4.0;
pub const DEFAULT_MAX_SEQUENCE_LENGTH: u32 = 512;

/// Output representation requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Raster images
    Pil,
    /// Raw array output
    Np,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pil => "pil",
            Self::Np => "np",
        }
    }
}

impl FromStr for OutputType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pil" => Ok(Self::Pil),
            "np" => Ok(Self::Np),
            other => Err(AppError::InvalidInput(format!(
                "Invalid 'output_type': expected one of 'pil', 'np', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Form fields exactly as received, before any interpretation
#[derive(Debug, Clone, Default)]
pub struct RawEditFields {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub images: Vec<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub size: Option<String>,
    pub n: Option<String>,
    pub num_inference_steps: Option<String>,
    pub guidance_scale: Option<String>,
    pub true_cfg_scale: Option<String>,
    pub output_type: Option<String>,
    pub max_sequence_length: Option<String>,
}

/// A fully validated edit request. Only [`validate`] produces one.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub(crate) prompt: String,
    pub(crate) negative_prompt: Option<String>,
    pub(crate) images: Vec<Bitmap>,
    pub(crate) mask: Option<Bitmap>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) n: u32,
    pub(crate) num_inference_steps: u32,
    pub(crate) guidance_scale: Option<f32>,
    pub(crate) true_cfg_scale: f32,
    pub(crate) output_type: OutputType,
    pub(crate) max_sequence_length: u32,
}

impl EditRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    pub fn images(&self) -> &[Bitmap] {
        &self.images
    }

    pub fn mask(&self) -> Option<&Bitmap> {
        self.mask.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn num_inference_steps(&self) -> u32 {
        self.num_inference_steps
    }

    pub fn guidance_scale(&self) -> Option<f32> {
        self.guidance_scale
    }

    pub fn true_cfg_scale(&self) -> f32 {
        self.true_cfg_scale
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn max_sequence_length(&self) -> u32 {
        self.max_sequence_length
    }

    /// Number of images the engine is expected to return
    pub fn expected_outputs(&self) -> usize {
        self.images.len() * self.n as usize
    }
}

/// Validate raw fields. Cheap checks run first; image decoding runs last.
pub fn validate(raw: RawEditFields) -> Result<EditRequest> {
    let prompt = raw
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Invalid 'prompt': must not be empty".to_string()))?
        .to_string();

    if raw.images.is_empty() {
        return Err(AppError::InvalidInput(
            "Invalid 'images': at least one image is required".to_string(),
        ));
    }

    let n = parse_u32("n", raw.n.as_deref(), DEFAULT_N)?;
    if !(1..=MAX_N).contains(&n) {
        return Err(AppError::InvalidInput(format!(
            "Invalid 'n': must be between 1 and {}, got {}",
            MAX_N, n
        )));
    }

    let num_inference_steps = parse_u32(
        "num_inference_steps",
        raw.num_inference_steps.as_deref(),
        DEFAULT_INFERENCE_STEPS,
    )?;
    if num_inference_steps < 1 {
        return Err(AppError::InvalidInput(
            "Invalid 'num_inference_steps': must be at least 1".to_string(),
        ));
    }

    let (width, height) = parse_size(non_blank(raw.size.as_deref()).unwrap_or(DEFAULT_SIZE))?;

    let output_type = match non_blank(raw.output_type.as_deref()) {
        Some(value) => value.parse()?,
        None => OutputType::Pil,
    };

    let guidance_scale = non_blank(raw.guidance_scale.as_deref())
        .map(|value| parse_f32("guidance_scale", value))
        .transpose()?;

    let true_cfg_scale = match non_blank(raw.true_cfg_scale.as_deref()) {
        Some(value) => parse_f32("true_cfg_scale", value)?,
        None => DEFAULT_TRUE_CFG_SCALE,
    };

    let max_sequence_length = parse_u32(
        "max_sequence_length",
        raw.max_sequence_length.as_deref(),
        DEFAULT_MAX_SEQUENCE_LENGTH,
    )?;
    if max_sequence_length < 1 {
        return Err(AppError::InvalidInput(
            "Invalid 'max_sequence_length': must be at least 1".to_string(),
        ));
    }

    let negative_prompt = raw
        .negative_prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    let images = codec::decode_all("images", &raw.images)?;
    let mask = raw
        .mask
        .map(|bytes| {
            codec::decode(&bytes).map_err(|e| {
                AppError::InvalidInput(format!("Invalid 'mask': could not be decoded: {}", e))
            })
        })
        .transpose()?;

    Ok(EditRequest {
        prompt,
        negative_prompt,
        images,
        mask,
        width,
        height,
        n,
        num_inference_steps,
        guidance_scale,
        true_cfg_scale,
        output_type,
        max_sequence_length,
    })
}

/// Parse a `WIDTHxHEIGHT` token into two positive integers
pub fn parse_size(token: &str) -> Result<(u32, u32)> {
    let invalid = || {
        AppError::InvalidInput(format!(
            "Invalid 'size': expected WIDTHxHEIGHT with positive integers, got '{}'",
            token
        ))
    };

    let parts: Vec<&str> = token.trim().split('x').collect();
    let [width, height] = parts.as_slice() else {
        return Err(invalid());
    };

    let width: u32 = width.parse().map_err(|_| invalid())?;
    let height: u32 = height.parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }

    Ok((width, height))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_u32(field: &str, value: Option<&str>, default: u32) -> Result<u32> {
    match non_blank(value) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| {
            AppError::InvalidInput(format!(
                "Invalid '{}': expected a non-negative integer, got '{}'",
                field, v
            ))
        }),
    }
}

fn parse_f32(field: &str, value: &str) -> Result<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Invalid '{}': expected a number, got '{}'",
                field, value
            ))
        })
}
