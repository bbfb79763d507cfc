//! HTTP API tests against an in-process relay

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tgshare::config::{Config, StorageBackend};
use tgshare::metadata::RecordStore;
use tgshare::server::{create_router, AppState};
use tgshare::share::TokenSource;
use tgshare::telegram::{BotIdentity, MediaKind, MediaRelay, OutgoingFile, RelayedFile};
use tgshare::{Error, Result};
use tower::ServiceExt;

const BOUNDARY: &str = "tgshare-test-boundary";

#[derive(Default)]
struct FakeRelay {
    uploads: Mutex<Vec<(String, MediaKind, Vec<u8>)>>,
    deleted: Mutex<Vec<i64>>,
    resolves: AtomicUsize,
    next_message: AtomicI64,
    fail_uploads: AtomicBool,
    fail_resolves: AtomicBool,
}

fn unavailable() -> Error {
    Error::TelegramApi {
        code: 502,
        description: "Bad Gateway".to_string(),
    }
}

#[async_trait]
impl MediaRelay for FakeRelay {
    async fn upload(&self, file: OutgoingFile) -> Result<RelayedFile> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let message_id = self.next_message.fetch_add(1, Ordering::SeqCst) + 100;
        self.uploads
            .lock()
            .push((file.file_name.clone(), file.kind, file.data.to_vec()));

        Ok(RelayedFile {
            file_id: format!("file-{}", message_id),
            message_id,
            kind: file.kind,
        })
    }

    async fn resolve_url(&self, file_id: &str) -> Result<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolves.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(format!("https://api.telegram.org/file/bot123:abc/documents/{}", file_id))
    }

    async fn delete(&self, message_id: i64) -> Result<()> {
        self.deleted.lock().push(message_id);
        Ok(())
    }

    async fn check(&self) -> Result<BotIdentity> {
        Err(Error::Telegram("not used".to_string()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.telegram.bot_token = "123:abc".to_string();
    config.telegram.channel_id = "-1001234567890".to_string();
    config.server.public_url = None;
    config.server.max_upload_size = 1024;
    config.storage.backend = StorageBackend::Memory;
    config
}

fn state_with(config: Config) -> (AppState, Arc<FakeRelay>) {
    let relay = Arc::new(FakeRelay::default());
    let store = RecordStore::temporary().unwrap();
    (AppState::new(config, store, relay.clone()), relay)
}

fn app_with(config: Config) -> (Router, Arc<FakeRelay>) {
    let (state, relay) = state_with(config);
    (create_router(state), relay)
}

fn app_with_tokens(tokens: TokenSource) -> (Router, Arc<FakeRelay>) {
    let (state, relay) = state_with(test_config());
    (create_router(state.with_token_source(tokens)), relay)
}

fn app() -> (Router, Arc<FakeRelay>) {
    app_with(test_config())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "share.test")
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(
    field: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(header::HOST, "share.test")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn padded_multipart(padding: usize) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    body.extend(std::iter::repeat(b'n').take(padding));
    body.extend_from_slice(
        format!(
            "\r\n--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhi\r\n--{b}--\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn text_only_multipart() -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn chunk_request(
    session: &str,
    index: u32,
    total: u32,
    data: &[u8],
    file_size: u64,
) -> Request<Body> {
    let payload = json!({
        "sessionId": session,
        "chunkIndex": index,
        "totalChunks": total,
        "chunkData": STANDARD.encode(data),
        "fileName": "report.pdf",
        "fileSize": file_size,
        "mimeType": "application/pdf",
    });

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload-chunked")
        .header(header::HOST, "share.test")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn upload_photo(app: &Router) -> Value {
    let request = multipart_request("file", "cat.jpg", "image/jpeg", b"jpegdata");
    let (status, _, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_reports_environment() {
    let (app, _) = app();

    for uri in ["/api", "/api/health"] {
        let (status, _, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["environment"]["TELEGRAM_BOT_TOKEN"], true);
        assert_eq!(body["environment"]["storage"], "memory");
        assert_eq!(body["storedFiles"], 0);
        assert_eq!(body["linkCache"]["entries"], 0);
        assert_eq!(body["linkCache"]["maxEntries"], 1024);
    }
}

#[tokio::test]
async fn upload_relays_and_returns_share_url() {
    let (app, relay) = app();
    let body = upload_photo(&app).await;

    assert_eq!(body["fileName"], "cat.jpg");
    assert_eq!(body["fileType"], "image");
    assert_eq!(body["fileSize"], 8);

    let token = body["shareToken"].as_str().unwrap();
    assert_eq!(token.len(), 8);
    assert_eq!(body["shareLink"], format!("http://share.test/s/{}", token));

    let uploads = relay.uploads.lock();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, MediaKind::Photo);
    assert_eq!(uploads[0].2, b"jpegdata");
}

#[tokio::test]
async fn upload_accepts_unnamed_file_field() {
    let (app, relay) = app();
    let request = multipart_request("media", "notes.txt", "text/plain", b"hi");
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fileType"], "document");
    assert_eq!(relay.uploads.lock()[0].1, MediaKind::Document);
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let (app, relay) = app();
    let (status, _, body) = send(&app, text_only_multipart()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
    assert!(relay.uploads.lock().is_empty());
}

#[tokio::test]
async fn upload_over_limit_is_rejected() {
    let (app, relay) = app();
    let data = vec![7u8; 2048];
    let request = multipart_request("file", "big.bin", "application/octet-stream", &data);
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "File too large");
    assert!(relay.uploads.lock().is_empty());
}

#[tokio::test]
async fn public_url_overrides_host() {
    let mut config = test_config();
    config.server.public_url = Some("https://files.example.com/".to_string());
    let (app, _) = app_with(config);

    let body = upload_photo(&app).await;
    let link = body["shareLink"].as_str().unwrap();
    assert!(link.starts_with("https://files.example.com/s/"));
}

#[tokio::test]
async fn chunked_upload_reassembles_in_order() {
    let (app, relay) = app();

    let (status, _, body) = send(&app, chunk_request("sess-1", 1, 3, b"world", 11)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], false);
    assert_eq!(body["receivedChunks"], 1);
    assert_eq!(body["totalChunks"], 3);
    assert_eq!(body["progress"], 33);

    let (_, _, body) = send(&app, chunk_request("sess-1", 2, 3, b"!", 11)).await;
    assert_eq!(body["complete"], false);
    assert_eq!(body["progress"], 67);

    let (status, _, body) = send(&app, chunk_request("sess-1", 0, 3, b"hello", 11)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], true);
    assert_eq!(body["success"], true);
    assert_eq!(body["file"]["fileName"], "report.pdf");
    assert_eq!(body["file"]["fileSize"], 11);

    assert_eq!(relay.uploads.lock()[0].2, b"helloworld!");

    let (_, _, health) = send(&app, get("/api/health")).await;
    assert_eq!(health["activeSessions"], 0);
    assert_eq!(health["storedFiles"], 1);
}

#[tokio::test]
async fn chunk_with_bad_base64_is_rejected() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload-chunked")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "sessionId": "s",
                "chunkIndex": 0,
                "totalChunks": 1,
                "chunkData": "%%%",
                "fileName": "a.bin",
            })
            .to_string(),
        ))
        .unwrap();

    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid chunk");
}

#[tokio::test]
async fn chunk_with_malformed_json_is_rejected() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload-chunked")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"sessionId\": 1"))
        .unwrap();

    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn abort_chunked_session() {
    let (app, _) = app();
    send(&app, chunk_request("sess-2", 0, 2, b"half", 8)).await;

    let abort = || {
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/upload-chunked/sess-2")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, _) = send(&app, abort()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, abort()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn share_link_redirects_to_telegram() {
    let (app, relay) = app();
    let body = upload_photo(&app).await;
    let token = body["shareToken"].as_str().unwrap().to_string();

    let (status, headers, _) = send(&app, get(&format!("/s/{}", token))).await;
    assert_eq!(status, StatusCode::FOUND);
    let location = headers.get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(location, "https://api.telegram.org/file/bot123:abc/documents/file-100");

    // Second hit is served from the link cache
    let (status, _, _) = send(&app, get(&format!("/s/{}", token))).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(relay.resolves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn share_info_returns_download_url() {
    let (app, _) = app();
    let body = upload_photo(&app).await;
    let token = body["shareToken"].as_str().unwrap().to_string();

    let (status, _, body) = send(&app, get(&format!("/api/share/{}", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["file"]["fileName"], "cat.jpg");
    let download_url = body["file"]["downloadUrl"].as_str().unwrap();
    assert!(download_url.starts_with("https://api.telegram.org/file/"));
    assert_eq!(body["shareInfo"]["shareLink"], format!("http://share.test/s/{}", token));
}

#[tokio::test]
async fn unknown_share_link_is_not_found() {
    let (app, _) = app();

    let (status, _, body) = send(&app, get("/api/share/nothere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "File not found");

    let (status, _, _) = send(&app, get("/s/nothere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_and_get_files() {
    let (app, _) = app();
    let first = upload_photo(&app).await;
    let (_, _, second) = send(&app, multipart_request("file", "b.txt", "text/plain", b"b")).await;

    let (status, _, list) = send(&app, get("/api/files")).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list
        .iter()
        .all(|f| f["shareLink"].as_str().unwrap().starts_with("http://share.test/s/")));

    let ids: Vec<_> = list.iter().map(|f| f["id"].clone()).collect();
    assert!(ids.contains(&first["id"]));
    assert!(ids.contains(&second["id"]));

    let id = first["id"].as_str().unwrap();
    let (status, _, file) = send(&app, get(&format!("/api/files/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["fileName"], "cat.jpg");
    assert!(file["fileUrl"].as_str().unwrap().ends_with("file-100"));

    let (status, _, _) = send(&app, get("/api/files/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_record_and_message() {
    let (app, relay) = app();
    let body = upload_photo(&app).await;
    let id = body["id"].as_str().unwrap().to_string();
    let token = body["shareToken"].as_str().unwrap().to_string();

    let delete = |id: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/files/{}", id))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, body) = send(&app, delete(&id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deletedFile"]["fileName"], "cat.jpg");
    assert_eq!(*relay.deleted.lock(), vec![100]);

    let (status, _, _) = send(&app, get(&format!("/s/{}", token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, delete(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_keeps_message_when_configured() {
    let mut config = test_config();
    config.telegram.delete_remote = false;
    let (app, relay) = app_with(config);

    let body = upload_photo(&app).await;
    let id = body["id"].as_str().unwrap();

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/files/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(relay.deleted.lock().is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected_before_file_field() {
    let (app, relay) = app();
    let (status, _, body) = send(&app, padded_multipart(128 * 1024)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "File too large");
    assert!(relay.uploads.lock().is_empty());
}

#[tokio::test]
async fn small_fields_before_file_are_skipped() {
    let (app, relay) = app();
    let (status, _, body) = send(&app, padded_multipart(16)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fileName"], "a.txt");
    assert_eq!(relay.uploads.lock()[0].2, b"hi");
}

#[tokio::test]
async fn relay_failure_stores_nothing() {
    let (app, relay) = app();
    relay.fail_uploads.store(true, Ordering::SeqCst);

    let request = multipart_request("file", "cat.jpg", "image/jpeg", b"jpeg");
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Telegram request failed");

    let (_, _, list) = send(&app, get("/api/files")).await;
    assert_eq!(list, json!([]));
    assert!(relay.deleted.lock().is_empty());
}

#[tokio::test]
async fn exhausted_share_links_discard_the_message() {
    let (app, relay) = app_with_tokens(|_| "Fixed123".to_string());

    let first = upload_photo(&app).await;
    assert_eq!(first["shareToken"], "Fixed123");

    // Every token the generator produces is now taken
    let request = multipart_request("file", "dog.jpg", "image/jpeg", b"jpeg");
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Could not create share link");

    assert_eq!(relay.uploads.lock().len(), 2);
    assert_eq!(*relay.deleted.lock(), vec![101]);

    let (_, _, list) = send(&app, get("/api/files")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["fileName"], "cat.jpg");
}

#[tokio::test]
async fn resolve_failure_is_bad_gateway() {
    let (app, relay) = app();
    let body = upload_photo(&app).await;
    let token = body["shareToken"].as_str().unwrap().to_string();
    relay.fail_resolves.store(true, Ordering::SeqCst);

    let (status, headers, body) = send(&app, get(&format!("/s/{}", token))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(headers.get(header::LOCATION).is_none());
    assert_eq!(body["error"], "Telegram request failed");

    let (status, _, body) = send(&app, get(&format!("/api/share/{}", token))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.get("file").is_none());

    // Failures are not cached; the link works once Telegram answers again
    relay.fail_resolves.store(false, Ordering::SeqCst);
    let (status, _, _) = send(&app, get(&format!("/s/{}", token))).await;
    assert_eq!(status, StatusCode::FOUND);
}

#[tokio::test]
async fn retried_final_chunk_is_conflict() {
    let (app, relay) = app();

    let (_, _, body) = send(&app, chunk_request("sess-3", 0, 1, b"once", 4)).await;
    assert_eq!(body["complete"], true);

    let (status, _, body) = send(&app, chunk_request("sess-3", 0, 1, b"once", 4)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Upload session already completed");
    assert_eq!(relay.uploads.lock().len(), 1);

    let (_, _, health) = send(&app, get("/api/health")).await;
    assert_eq!(health["activeSessions"], 0);
}

#[tokio::test]
async fn session_cap_is_service_unavailable() {
    let mut config = test_config();
    config.upload.max_sessions = 1;
    let (app, _) = app_with(config);

    let (status, _, _) = send(&app, chunk_request("first", 0, 2, b"a", 2)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, chunk_request("second", 0, 2, b"a", 2)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Server is busy with other uploads");

    let (status, _, body) = send(&app, chunk_request("first", 1, 2, b"b", 2)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], true);
}
