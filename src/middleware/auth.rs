//! Shared-secret authentication middleware

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;

/// Paths served without credentials
const PUBLIC_PATHS: &[&str] = &["/health", "/ready"];

/// Outcome of a credential check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    Unauthorized,
}

/// Checks callers against an optional shared secret
#[derive(Clone)]
pub struct CredentialVerifier {
    secret: Option<String>,
}

impl CredentialVerifier {
    /// A verifier with no secret admits everyone
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Compare the provided secret with the configured one in constant time
    pub fn verify(&self, provided: Option<&str>) -> Verdict {
        let Some(secret) = &self.secret else {
            return Verdict::Authorized;
        };

        let Some(provided) = provided else {
            debug!("No credential provided");
            return Verdict::Unauthorized;
        };

        // Hashing first keeps the comparison length-independent
        let expected = Sha256::digest(secret.as_bytes());
        let actual = Sha256::digest(provided.as_bytes());

        if constant_time_eq(&expected, &actual) {
            Verdict::Authorized
        } else {
            warn!(credential = %fingerprint(provided), "Rejected credential");
            Verdict::Unauthorized
        }
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

/// Short, non-reversible identifier of a credential for logs
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    format!("sha256:{}", &hex::encode(digest)[..8])
}

/// Pull the secret out of the Authorization header.
///
/// Basic auth carries it in the password (the username is ignored); a bare
/// Bearer token is also accepted for OpenAI-style clients.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();

    if let Some(encoded) = value.strip_prefix("Basic ") {
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (_user, password) = decoded.split_once(':')?;
        return Some(password.to_string());
    }

    value.strip_prefix("Bearer ").map(|token| token.trim().to_string())
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<CredentialVerifier>,
}

impl AuthLayer {
    pub fn new(verifier: Arc<CredentialVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    verifier: Arc<CredentialVerifier>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if PUBLIC_PATHS.contains(&request.uri().path()) || !self.verifier.is_enabled() {
            return Box::pin(self.inner.call(request));
        }

        let credential = extract_credential(request.headers());

        match self.verifier.verify(credential.as_deref()) {
            Verdict::Authorized => Box::pin(self.inner.call(request)),
            Verdict::Unauthorized => {
                let message = if credential.is_some() {
                    "Invalid credentials"
                } else {
                    "Credentials required. Provide the API key as the Basic auth password"
                };
                let response = AppError::Unauthorized(message.to_string()).into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
