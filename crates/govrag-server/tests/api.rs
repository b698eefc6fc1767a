//! Router-level tests: request and response shapes of the HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use govrag_chat::{GenerationConfig, LlmBackend, LlmSettings, ProviderGateway, ProviderKind};
use govrag_core::{GovRagConfig, ProviderError, RetryPolicy};
use govrag_infer::HashingEmbedder;
use govrag_server::{build_router, search_defaults, AppState};
use govrag_store::VectorIndex;

const DIM: usize = 64;
const BOUNDARY: &str = "govrag-test-boundary";

/// Answers every prompt with a fixed text.
struct CannedBackend;

#[async_trait]
impl LlmBackend for CannedBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String, ProviderError> {
        Ok("Resposta de teste.".into())
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    data: TempDir,
}

fn test_app() -> TestApp {
    let data = TempDir::new().unwrap();
    let mut config = GovRagConfig::from_env(data.path()).unwrap();
    config.embedding_dim = DIM;
    config.chunk_size = 400;
    config.chunk_overlap = 40;

    let index = Arc::new(VectorIndex::in_memory(DIM, search_defaults(&config)).unwrap());
    let gateway = ProviderGateway::new(RetryPolicy::none()).with_backend(Arc::new(CannedBackend));
    let state = Arc::new(
        AppState::new(
            config,
            index,
            Arc::new(HashingEmbedder::new(DIM)),
            gateway,
            LlmSettings::default(),
        )
        .unwrap(),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
        data,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/ingest/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_index_stats() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index"]["documents"], 0);
    assert_eq!(body["index"]["dimension"], DIM);
    assert_eq!(body["embedder"], "hashing");
    assert_eq!(body["providers"], json!(["openai"]));
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let app = test_app();
    let (status, body) = send(&app.router, post_json("/query", json!({"query": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_unknown_provider_and_search_type_are_bad_requests() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        post_json("/query", json!({"query": "prazo", "provider": "mistral"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        post_json("/query", json!({"query": "prazo", "search_type": "hybrid"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("hybrid"));
}

#[tokio::test]
async fn test_query_against_empty_index_still_answers() {
    let app = test_app();
    let (status, body) = send(&app.router, post_json("/query", json!({"query": "test"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Resposta de teste.");
    assert_eq!(body["sources"], json!([]));
}

#[tokio::test]
async fn test_ingest_missing_directory_is_not_found() {
    let app = test_app();
    let missing = app.data.path().join("does-not-exist");
    let (status, body) = send(
        &app.router,
        post_json("/ingest", json!({"data_dir": missing.to_string_lossy()})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_ingest_then_query_returns_sources() {
    let app = test_app();
    let docs = TempDir::new().unwrap();
    std::fs::write(
        docs.path().join("passaporte.txt"),
        "A taxa para emissão do passaporte comum é paga por meio de GRU.",
    )
    .unwrap();
    std::fs::write(docs.path().join("planilha.exe"), b"MZ").unwrap();

    let (status, body) = send(
        &app.router,
        post_json(
            "/ingest",
            json!({"data_dir": docs.path().to_string_lossy(), "clear_existing": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents_processed"], 1);
    assert!(body["chunks_indexed"].as_u64().unwrap() >= 1);
    assert!(body["failures"].is_array());

    let (status, body) = send(
        &app.router,
        post_json(
            "/query",
            json!({"query": "taxa do passaporte", "search_type": "similarity", "search_k": 3}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert!(sources[0]["source"].as_str().unwrap().ends_with("passaporte.txt"));
}

#[tokio::test]
async fn test_unsupported_upload_is_rejected_without_job() {
    let app = test_app();
    let (status, body) = send(&app.router, upload("setup.exe", b"MZ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (_, jobs) = send(&app.router, get("/ingest/jobs")).await;
    assert_eq!(jobs["total"], 0);
    assert!(app.state.orchestrator.jobs().is_empty());
}

#[tokio::test]
async fn test_upload_is_accepted_and_tracked() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        upload("guia.txt", "Agendamento do RG pela internet.".as_bytes()),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["message"].as_str().unwrap().contains("guia.txt"));
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = send(&app.router, get(&format!("/ingest/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["id"], job_id.as_str());
    assert_eq!(job["filename"], "guia.txt");
    assert_eq!(job["state"], "accepted");

    let (status, _) = send(&app.router, get("/ingest/jobs/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/ingest/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!("--{BOUNDARY}--\r\n")))
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
