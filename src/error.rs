//! Error taxonomy for the gateway and its mapping onto the wire

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Realm advertised in the Basic auth challenge
pub const AUTH_REALM: &str = "Basic realm=\"image-edit\"";

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Model is not loaded yet")]
    ModelNotReady,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    ResourceBusy(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Image edit failed: {0}")]
    Engine(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Status and stable error code for this kind
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::ModelNotReady => (StatusCode::SERVICE_UNAVAILABLE, "model_not_ready"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AppError::ResourceBusy(_) => (StatusCode::TOO_MANY_REQUESTS, "resource_busy"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "engine_error"),
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::HttpClient(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Message safe to hand to the caller
    fn public_message(&self) -> String {
        match self {
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::HttpClient(_)
            | AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!(code = code, error = %self, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.public_message(),
        });

        let mut response = (status, body).into_response();
        if matches!(self, AppError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
        }
        response
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
