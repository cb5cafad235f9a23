//! Boundary types and trait for the image synthesis engine

use async_trait::async_trait;

use crate::codec::Bitmap;
use crate::error::Result;
use crate::validation::OutputType;

/// Image argument of an engine call.
///
/// A lone upload is passed as-is; several uploads travel as one batch.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Single(Bitmap),
    Batch(Vec<Bitmap>),
}

impl ImageInput {
    pub fn from_images(mut images: Vec<Bitmap>) -> Self {
        if images.len() == 1 {
            Self::Single(images.remove(0))
        } else {
            Self::Batch(images)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(images) => images.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[Bitmap] {
        match self {
            Self::Single(image) => std::slice::from_ref(image),
            Self::Batch(images) => images,
        }
    }
}

/// One invocation of the engine
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub prompt: String,
    /// Only set when the caller supplied one; engine default otherwise
    pub negative_prompt: Option<String>,
    pub image: ImageInput,
    pub mask: Option<Bitmap>,
    pub width: u32,
    pub height: u32,
    /// Variants generated for each input image
    pub num_images_per_prompt: u32,
    pub num_inference_steps: u32,
    /// Only set when the caller supplied one; engine default otherwise
    pub guidance_scale: Option<f32>,
    pub true_cfg_scale: f32,
    pub output_type: OutputType,
    pub max_sequence_length: u32,
}

/// Engine output, flattened in (input index, variant index) order
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub images: Vec<Bitmap>,
}

/// The stateful synthesis engine.
///
/// Methods take `&mut self`: whoever owns the engine has exclusive access,
/// and the resource gate's worker is the only owner once serving starts.
#[async_trait]
pub trait SynthesisEngine: Send {
    /// Human-readable engine name for logs
    fn name(&self) -> &str;

    /// Bring the engine to a state where `edit` can be served
    async fn load(&mut self) -> Result<()>;

    /// Run one edit call
    async fn edit(&mut self, call: EngineCall) -> Result<EngineOutput>;
}
