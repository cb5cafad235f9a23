//! Functional tests for the HTTP engine client against a mock model worker

use image::Rgb;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use image_edit_gateway::codec::{self, Bitmap};
use image_edit_gateway::config::EngineConfig;
use image_edit_gateway::engine::http_engine::HttpEngine;
use image_edit_gateway::engine::{EngineCall, ImageInput, SynthesisEngine};
use image_edit_gateway::validation::OutputType;
use image_edit_gateway::AppError;

fn engine_config(endpoint: &str) -> EngineConfig {
    EngineConfig {
        endpoint: endpoint.to_string(),
        model_dir: "/models/qwen-image-edit".to_string(),
        device: "cuda".to_string(),
        timeout_secs: 10,
        load_poll_interval_secs: 0,
        load_max_attempts: 3,
    }
}

fn call(image: ImageInput, variants: u32) -> EngineCall {
    EngineCall {
        prompt: "make the sky blue".to_string(),
        negative_prompt: None,
        image,
        mask: None,
        width: 1024,
        height: 1024,
        num_images_per_prompt: variants,
        num_inference_steps: 50,
        guidance_scale: None,
        true_cfg_scale: 4.0,
        output_type: OutputType::Pil,
        max_sequence_length: 512,
    }
}

fn pixel(value: u8) -> Bitmap {
    Bitmap::from_pixel(2, 2, Rgb([value, value, value]))
}

async fn last_request_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

#[tokio::test]
async fn test_load_waits_for_worker_then_loads_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/load"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    engine.load().await.unwrap();

    let body = last_request_body(&server).await;
    assert_eq!(body["model_dir"], "/models/qwen-image-edit");
    assert_eq!(body["device"], "cuda");
}

#[tokio::test]
async fn test_load_gives_up_when_worker_never_comes_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    let err = engine.load().await.unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));
}

#[tokio::test]
async fn test_edit_single_image() {
    let server = MockServer::start().await;
    let output = codec::encode(&pixel(9)).unwrap();
    Mock::given(method("POST"))
        .and(path("/edit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": [output] })))
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    let result = engine.edit(call(ImageInput::Single(pixel(1)), 1)).await.unwrap();

    assert_eq!(result.images.len(), 1);
    assert_eq!(result.images[0].get_pixel(0, 0).0, [9, 9, 9]);

    let body = last_request_body(&server).await;
    assert!(body["image"].is_string());
    assert_eq!(body["num_images_per_prompt"], 1);
    assert_eq!(body["output_type"], "pil");
    assert!(body.get("negative_prompt").is_none());
    assert!(body.get("guidance_scale").is_none());
    assert!(body.get("mask_image").is_none());
}

#[tokio::test]
async fn test_edit_batch_forwards_all_images_and_optionals() {
    let server = MockServer::start().await;
    let outputs: Vec<String> = (0..4u8).map(|v| codec::encode(&pixel(v)).unwrap()).collect();
    Mock::given(method("POST"))
        .and(path("/edit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": outputs })))
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    let mut request = call(ImageInput::Batch(vec![pixel(1), pixel(2)]), 2);
    request.negative_prompt = Some("blurry".to_string());
    request.guidance_scale = Some(3.5);
    let result = engine.edit(request).await.unwrap();

    assert_eq!(result.images.len(), 4);
    assert_eq!(result.images[3].get_pixel(0, 0).0, [3, 3, 3]);

    let body = last_request_body(&server).await;
    assert_eq!(body["image"].as_array().unwrap().len(), 2);
    assert_eq!(body["negative_prompt"], "blurry");
    assert_eq!(body["guidance_scale"], 3.5);
}

#[tokio::test]
async fn test_edit_worker_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edit"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Traceback: torch.cuda.OutOfMemoryError"))
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    let err = engine.edit(call(ImageInput::Single(pixel(1)), 1)).await.unwrap_err();

    match err {
        AppError::Engine(message) => assert!(!message.contains("Traceback")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_edit_rejects_non_image_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": ["bm90IGFuIGltYWdl"] })))
        .mount(&server)
        .await;

    let mut engine = HttpEngine::new(&engine_config(&server.uri())).unwrap();
    let err = engine.edit(call(ImageInput::Single(pixel(1)), 1)).await.unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));
}
