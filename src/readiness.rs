//! Process-wide model readiness flag

use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use tracing::info;

/// Tracks whether the synthesis engine has finished loading.
///
/// The flag moves from not-loaded to loaded at most once and never back;
/// engine failures after load do not affect it.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    loaded_at: OnceLock<DateTime<Utc>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the engine is loaded. Later calls are no-ops.
    pub fn mark_loaded(&self) {
        if self.loaded_at.set(Utc::now()).is_ok() {
            info!("Model marked as loaded");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded_at.get().is_some()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at.get().copied()
    }
}
