//! HTTP API tests driven through the router with `tower::ServiceExt`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use repochat::config::Config;
use repochat::embedding::{Embedder, HashProvider};
use repochat::generation::{GenerationRequest, Generator};
use repochat::index::MemoryIndexStore;
use repochat::materialize::checkout_dir;
use repochat::server::{router, AppState};
use repochat::{RepoChat, RepoId};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

/// Echoes the question, the history length, and the best chunk.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let best = request
            .context
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or("");
        Ok(format!(
            "q={} turns={} best={}",
            request.question,
            request.history.len(),
            best
        ))
    }
}

fn chat(tmp: &TempDir) -> Arc<RepoChat> {
    let mut config = Config::default();
    config.repos.clone_dir = tmp.path().join("repos");
    Arc::new(RepoChat::new(
        config,
        Embedder::new(Arc::new(HashProvider::new(128)), 16),
        Arc::new(EchoGenerator),
        Arc::new(MemoryIndexStore::new()),
    ))
}

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

async fn send(chat: &Arc<RepoChat>, request: Request<Body>) -> (StatusCode, Value) {
    let app = router(AppState { chat: chat.clone() }).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(&chat(&tmp), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_before_processing_is_client_error() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(
        &chat(&tmp),
        post_json(
            "/chat",
            json!({ "repo_name": "octocat_hello-world", "question": "what?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "not_ingested");
}

#[tokio::test]
async fn test_chat_with_history() {
    let tmp = TempDir::new().unwrap();
    let chat = chat(&tmp);
    let id = RepoId::parse("octocat_hello-world").unwrap();
    let root = checkout_dir(&chat.config().repos, &id);
    write(&root, "README", b"Hello World!");
    assert!(chat.ingest(&root, &id).await.success);

    let (status, body) = send(
        &chat,
        post_json(
            "/chat",
            json!({
                "repo_name": "octocat_hello-world",
                "question": "What does it print?",
                "chat_history": [["Hi", "Hello"], ["Again?", "Sure"]]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "q=What does it print? turns=2 best=Hello World!"
    );
}

#[tokio::test]
async fn test_chat_rejects_malformed_repo_name() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(
        &chat(&tmp),
        post_json("/chat", json!({ "repo_name": "../etc", "question": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_file_content() {
    let tmp = TempDir::new().unwrap();
    let chat = chat(&tmp);
    let id = RepoId::parse("octocat_hello-world").unwrap();
    let root = checkout_dir(&chat.config().repos, &id);
    write(&root, "src/main.rs", b"fn main() {}");
    write(tmp.path(), "repos/secret.txt", b"outside the checkout");

    let (status, body) = send(
        &chat,
        get("/file-content?repo_name=octocat_hello-world&file_path=src/main.rs"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "fn main() {}");
    assert_eq!(body["path"], "src/main.rs");
    assert_eq!(body["name"], "main.rs");

    let (status, _) = send(
        &chat,
        get("/file-content?repo_name=octocat_hello-world&file_path=../secret.txt"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &chat,
        get("/file-content?repo_name=octocat_hello-world&file_path=nope.rs"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_repo_rejects_non_github_url() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = send(
        &chat(&tmp),
        post_json("/process-repo", json!({ "url": "https://example.com/a/b" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Invalid GitHub URL"));
}
