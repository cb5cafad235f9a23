//! Functional tests for the HTTP surface

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use common::{png_bytes, FakeEngine, Probe};
use image_edit_gateway::{api, config::Settings, AppState};

const BOUNDARY: &str = "X-EDIT-BOUNDARY";

/// Hand-rolled multipart body
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

fn settings(api_key: Option<&str>) -> Settings {
    let mut settings = Settings::default();
    settings.auth.api_key = api_key.map(String::from);
    settings.gate.max_queue_depth = 4;
    settings.gate.request_timeout_secs = 30;
    settings
}

/// App with the fake engine attached and readiness set
fn loaded_app(api_key: Option<&str>) -> (Router, Arc<AppState>, Arc<Probe>) {
    let state = Arc::new(AppState::new(settings(api_key)));
    let (engine, probe) = FakeEngine::new();
    state.gate.start(Box::new(engine)).unwrap();
    state.readiness.mark_loaded();
    (api::create_router(state.clone()), state, probe)
}

fn edit_request(form: Form) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/images/edits")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(form.finish()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_always_ok() {
    let state = Arc::new(AppState::new(settings(None)));
    let app = api::create_router(state);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_i64());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_not_ready_before_load() {
    let state = Arc::new(AppState::new(settings(None)));
    let app = api::create_router(state.clone());

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_ready");

    let form = Form::default()
        .text("prompt", "make the sky blue")
        .file("images", &png_bytes(4, 4, [1, 2, 3]));
    let (status, body) = send(&app, edit_request(form)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_ready");

    let stats = state.gate.stats();
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.completed + stats.failed + stats.rejected, 0);
}

#[tokio::test]
async fn test_ready_stays_ready_after_engine_failure() {
    let (app, _, _) = loaded_app(None);

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["model_loaded"], true);

    let form = Form::default()
        .text("prompt", "explode")
        .file("images", &png_bytes(4, 4, [1, 2, 3]));
    let (status, body) = send(&app, edit_request(form)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "engine_error");
    assert!(!body["message"].as_str().unwrap().contains("CUDA"));

    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_single_image_edit() {
    let (app, _, probe) = loaded_app(None);

    let form = Form::default()
        .text("prompt", "make the sky blue")
        .text("n", "1")
        .file("images", &png_bytes(8, 8, [0, 0, 255]));
    let (status, body) = send(&app, edit_request(form)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert!(body["data"][0]["b64_json"].is_string());
    assert_eq!(body["usage"]["input_images"], 1);
    assert_eq!(body["usage"]["generated_images"], 1);
    assert!(body["usage"]["processing_time_seconds"].is_f64());
    assert!(body["created"].is_i64());
    assert_eq!(probe.prompts(), vec!["make the sky blue".to_string()]);
}

#[tokio::test]
async fn test_two_images_three_variants() {
    let (app, _, probe) = loaded_app(None);

    let form = Form::default()
        .text("prompt", "add snow")
        .text("n", "3")
        .text("size", "512x512")
        .file("images", &png_bytes(4, 4, [1, 1, 1]))
        .file("images", &png_bytes(4, 4, [2, 2, 2]));
    let (status, body) = send(&app, edit_request(form)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 6);
    assert_eq!(body["usage"]["input_images"], 2);
    assert_eq!(body["usage"]["generated_images"], 6);

    let calls = probe.calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].batched);
    assert_eq!(calls[0].variants, 3);
}

#[tokio::test]
async fn test_invalid_size_names_the_field() {
    let (app, _, probe) = loaded_app(None);

    let form = Form::default()
        .text("prompt", "p")
        .text("size", "0x10")
        .file("images", &png_bytes(4, 4, [1, 2, 3]));
    let (status, body) = send(&app, edit_request(form)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("size"));
    assert_eq!(probe.call_count(), 0);
}

#[tokio::test]
async fn test_missing_images_rejected() {
    let (app, _, probe) = loaded_app(None);

    let form = Form::default().text("prompt", "p");
    let (status, body) = send(&app, edit_request(form)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at least one image"));
    assert_eq!(probe.call_count(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_rejected() {
    let (app, _, _) = loaded_app(None);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/images/edits")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_edit_requires_credentials_when_configured() {
    let (app, _, probe) = loaded_app(Some("s3cret"));

    let form = Form::default()
        .text("prompt", "p")
        .file("images", &png_bytes(4, 4, [1, 2, 3]));
    let (status, body) = send(&app, edit_request(form)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(probe.call_count(), 0);

    // Probes stay public
    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_edit_with_credentials() {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let (app, _, _) = loaded_app(Some("s3cret"));

    let form = Form::default()
        .text("prompt", "p")
        .file("image", &png_bytes(4, 4, [1, 2, 3]));
    let mut request = edit_request(form);
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Basic {}", STANDARD.encode("user:s3cret"))
            .parse()
            .unwrap(),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn test_gate_stats_endpoint() {
    let (app, _, _) = loaded_app(None);

    let form = Form::default()
        .text("prompt", "p")
        .file("images", &png_bytes(4, 4, [1, 2, 3]));
    let (status, _) = send(&app, edit_request(form)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/v1/gate/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["max_queue_depth"], 4);
    assert_eq!(body["running"], false);
}
