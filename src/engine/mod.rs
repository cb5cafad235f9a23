//! Engine module - Synthesis engine seam, HTTP worker client, and edit orchestration

pub mod http_engine;
pub mod orchestrator;
pub mod traits;

pub use orchestrator::{EditOrchestrator, EditResult};
pub use traits::{EngineCall, EngineOutput, ImageInput, SynthesisEngine};
