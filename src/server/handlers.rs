//! Route handlers

use crate::chunk::{ChunkOutcome, ChunkUpload};
use crate::error::{Error, Result};
use crate::metadata::FileRecord;
use crate::server::AppState;
use crate::share::{base_url, is_valid_token, share_url};
use crate::telegram::{normalize_mime, FileKind, OutgoingFile};

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// A record as returned to clients, with `shareLink` expanded to a full URL
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: FileKind,
    pub mime_type: String,
    pub telegram_file_id: String,
    pub telegram_message_id: i64,
    pub share_link: String,
    pub share_token: String,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl FileView {
    pub fn new(record: FileRecord, base: &str) -> Self {
        FileView {
            share_link: share_url(base, &record.share_link),
            share_token: record.share_link,
            id: record.id,
            file_name: record.file_name,
            file_size: record.file_size,
            file_type: record.file_type,
            mime_type: record.mime_type,
            telegram_file_id: record.telegram_file_id,
            telegram_message_id: record.telegram_message_id,
            content_hash: record.content_hash,
            uploaded_at: record.uploaded_at,
            file_url: None,
        }
    }

    fn with_file_url(mut self, url: String) -> Self {
        self.file_url = Some(url);
        self
    }
}

fn public_base(state: &AppState, headers: &HeaderMap) -> String {
    base_url(state.config.server.public_url.as_deref(), headers)
}

/// `GET /api` and `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let telegram = &state.config.telegram;

    Json(json!({
        "message": "tgshare API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": {
            "TELEGRAM_BOT_TOKEN": !telegram.bot_token.is_empty(),
            "TELEGRAM_CHANNEL_ID": !telegram.channel_id.is_empty(),
            "storage": state.config.storage.backend.as_str(),
        },
        "activeSessions": state.sessions.len(),
        "storedFiles": state.store.len(),
        "linkCache": state.links.stats(),
    }))
}

/// A file part pulled out of a multipart body
struct ReceivedFile {
    file_name: String,
    mime_type: Option<String>,
    data: Bytes,
}

/// `POST /api/upload`
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<FileView>> {
    let mut multipart = multipart.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let limit = state.config.server.max_upload_size;
    let body_limit = super::upload_body_limit(limit) as u64;

    let mut named = None;
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, body_limit))?
    {
        let is_file_field = field.name() == Some("file");
        if !is_file_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let received = read_file_field(field, limit, body_limit).await?;
        if is_file_field {
            named = Some(received);
            break;
        }
        fallback = Some(received);
    }

    let received = named
        .or(fallback)
        .ok_or_else(|| Error::InvalidRequest("No file uploaded".to_string()))?;

    info!("Upload of {} ({} bytes)", received.file_name, received.data.len());

    let file = OutgoingFile::new(
        received.file_name,
        normalize_mime(received.mime_type.as_deref()),
        received.data,
        state.media_limits(),
    );
    let record = state.store_file(file).await?;

    Ok(Json(FileView::new(record, &public_base(&state, &headers))))
}

async fn read_file_field(
    mut field: Field<'_>,
    limit: u64,
    body_limit: u64,
) -> Result<ReceivedFile> {
    let file_name = field
        .file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("upload.bin")
        .to_string();
    let mime_type = field.content_type().map(str::to_string);

    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, body_limit))?
    {
        let size = (data.len() + chunk.len()) as u64;
        if size > limit {
            return Err(Error::PayloadTooLarge { size, limit });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(ReceivedFile {
        file_name,
        mime_type,
        data: data.freeze(),
    })
}

/// Body limit overruns surface as multipart errors too
fn multipart_error(e: MultipartError, body_limit: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::BodyLimit(body_limit)
    } else {
        Error::InvalidRequest(format!("Malformed multipart body: {}", e))
    }
}

/// `POST /api/upload-chunked`
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChunkUpload>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(chunk) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::BodyLimit(super::chunk_body_limit(state.config.server.max_upload_size) as u64)
        } else {
            Error::InvalidRequest(e.body_text())
        }
    })?;

    let file = match state.sessions.accept(&chunk)? {
        ChunkOutcome::Progress(progress) => {
            return Ok(Json(json!({
                "success": true,
                "complete": false,
                "sessionId": chunk.session_id,
                "progress": progress.percent,
                "receivedChunks": progress.received,
                "totalChunks": progress.total,
            })));
        }
        ChunkOutcome::Complete(file) => file,
    };

    if file.declared_size != 0 && file.declared_size != file.size() {
        warn!(
            "Session {} declared {} bytes but assembled {}",
            chunk.session_id,
            file.declared_size,
            file.size()
        );
    }

    let outgoing = OutgoingFile::new(
        file.file_name,
        file.mime_type,
        file.data,
        state.media_limits(),
    );
    let record = state.store_file(outgoing).await?;

    Ok(Json(json!({
        "success": true,
        "complete": true,
        "message": "File uploaded successfully!",
        "file": FileView::new(record, &public_base(&state, &headers)),
        "chunksReceived": chunk.total_chunks,
    })))
}

/// `DELETE /api/upload-chunked/:session_id`
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    if state.sessions.remove(&session_id) {
        debug!("Aborted upload session {}", session_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::SessionNotFound(session_id))
    }
}

/// `GET /api/files`
pub async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileView>>> {
    let base = public_base(&state, &headers);
    let files = state
        .store
        .list()?
        .into_iter()
        .map(|record| FileView::new(record, &base))
        .collect();

    Ok(Json(files))
}

/// `GET /api/files/:id`
pub async fn get_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FileView>> {
    let record = state.store.get(&id)?.ok_or(Error::FileNotFound(id))?;
    let url = state.resolve_url(&record).await?;

    Ok(Json(FileView::new(record, &public_base(&state, &headers)).with_file_url(url)))
}

/// `DELETE /api/files/:id`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let record = state.delete_file(&id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("File {} deleted successfully", record.file_name),
        "deletedFile": {
            "id": record.id,
            "fileName": record.file_name,
        },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

fn find_shared(state: &AppState, token: &str) -> Result<FileRecord> {
    if !is_valid_token(token) {
        return Err(Error::ShareLinkNotFound(token.to_string()));
    }

    state
        .store
        .get_by_share_link(token)?
        .ok_or_else(|| Error::ShareLinkNotFound(token.to_string()))
}

/// `GET /api/share/:link`
pub async fn share_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<Value>> {
    let record = find_shared(&state, &token)?;
    let download_url = state.resolve_url(&record).await?;

    Ok(Json(json!({
        "success": true,
        "file": {
            "id": record.id,
            "fileName": record.file_name,
            "fileSize": record.file_size,
            "fileType": record.file_type,
            "mimeType": record.mime_type,
            "uploadedAt": record.uploaded_at,
            "downloadUrl": download_url,
        },
        "shareInfo": {
            "shareLink": share_url(&public_base(&state, &headers), &record.share_link),
            "accessedAt": Utc::now().to_rfc3339(),
        },
    })))
}

/// `GET /s/:link`, redirecting to the file on Telegram
pub async fn share_redirect(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let record = find_shared(&state, &token)?;
    let url = state.resolve_url(&record).await?;

    debug!("Share link {} -> {}", token, record.id);

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, url), (header::CACHE_CONTROL, "no-store".to_string())],
    )
        .into_response())
}
