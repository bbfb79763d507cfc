//! HTTP mapping for crate errors

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::FileNotFound(_) | Error::ShareLinkNotFound(_) | Error::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::InvalidRequest(_) | Error::InvalidChunk(_) | Error::SessionMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::PayloadTooLarge { .. } | Error::BodyLimit(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Telegram(_) | Error::TelegramApi { .. } | Error::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::ShareLinkTaken(_) | Error::SessionCompleted(_) => StatusCode::CONFLICT,
            Error::ShareLinkExhausted(_) | Error::UploadCapacity(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::Io(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short headline for the `error` field
    fn summary(&self) -> &str {
        match self {
            Error::FileNotFound(_) | Error::ShareLinkNotFound(_) => "File not found",
            Error::SessionNotFound(_) => "Upload session not found",
            Error::SessionCompleted(_) => "Upload session already completed",
            Error::UploadCapacity(_) => "Server is busy with other uploads",
            Error::InvalidRequest(msg) => msg.as_str(),
            Error::InvalidChunk(_) | Error::SessionMismatch(_) => "Invalid chunk",
            Error::PayloadTooLarge { .. } | Error::BodyLimit(_) => "File too large",
            Error::Telegram(_) | Error::TelegramApi { .. } | Error::Http(_) => {
                "Telegram request failed"
            }
            Error::ShareLinkTaken(_) | Error::ShareLinkExhausted(_) => {
                "Could not create share link"
            }
            _ => "Server error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = Json(json!({
            "error": self.summary(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
