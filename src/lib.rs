//! Image Edit Gateway
//!
//! An HTTP front for a single, exclusive image-synthesis engine. Requests are
//! authenticated, validated, and then serialized through a bounded FIFO gate
//! so the engine only ever runs one edit at a time.

pub mod api;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod readiness;
pub mod validation;

pub use error::{AppError, Result};

use std::sync::Arc;

use gate::ResourceGate;
use middleware::CredentialVerifier;
use readiness::ReadinessTracker;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub verifier: Arc<CredentialVerifier>,
    pub readiness: Arc<ReadinessTracker>,
    pub gate: Arc<ResourceGate>,
}

impl AppState {
    /// Build state from settings. The gate has no engine until one is started.
    pub fn new(settings: config::Settings) -> Self {
        Self {
            verifier: Arc::new(CredentialVerifier::new(settings.auth.api_key.clone())),
            readiness: Arc::new(ReadinessTracker::new()),
            gate: Arc::new(ResourceGate::new(&settings.gate)),
            settings: Arc::new(settings),
        }
    }
}
