//! Bot API wire types
//!
//! Only the fields tgshare reads are modelled; everything else in the
//! Telegram payloads is ignored by serde.

use serde::Deserialize;

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait after a flood-control rejection
    pub retry_after: Option<u64>,
}

/// Subset of `Message` returned by the send* methods
#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub photo: Option<Vec<PhotoSize>>,
    pub video: Option<FileAttachment>,
    pub document: Option<FileAttachment>,
    pub animation: Option<FileAttachment>,
    pub audio: Option<FileAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

/// Video, document, animation and audio share these fields
#[derive(Debug, Deserialize)]
pub struct FileAttachment {
    pub file_id: String,
}

/// Result of `getFile`
#[derive(Debug, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    /// Missing when the file is too large for the Bot API to serve
    pub file_path: Option<String>,
}

/// Result of `getMe`
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl Message {
    /// File id of the stored media, preferring the largest photo size
    pub fn file_id(&self) -> Option<&str> {
        if let Some(sizes) = &self.photo {
            return sizes.last().map(|p| p.file_id.as_str());
        }

        self.video
            .as_ref()
            .or(self.document.as_ref())
            .or(self.animation.as_ref())
            .or(self.audio.as_ref())
            .map(|f| f.file_id.as_str())
    }
}
