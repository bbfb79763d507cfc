//! Telegram relay storage
//!
//! Uploaded files are posted to a Telegram channel by a bot, and download
//! links are resolved on demand through `getFile`. The HTTP layer only sees
//! the [`MediaRelay`] trait; [`BotClient`] is the Bot API implementation.

mod client;
mod media;
mod rate_limit;
mod types;

pub use client::BotClient;
pub use media::{normalize_mime, route_media, FileKind, MediaKind, MediaLimits};
pub use rate_limit::{ExponentialBackoff, RateLimiter};
pub use types::BotIdentity;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Telegram caps captions at 1024 characters
pub const MAX_CAPTION_LEN: usize = 1024;

/// A file on its way to the channel
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
    /// Send method picked by [`route_media`]
    pub kind: MediaKind,
}

impl OutgoingFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
        limits: MediaLimits,
    ) -> Self {
        let mime_type = mime_type.into();
        let kind = route_media(&mime_type, data.len() as u64, limits);

        OutgoingFile {
            file_name: file_name.into(),
            mime_type,
            data,
            kind,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Caption posted with the file, truncated to Telegram's limit
    pub fn caption(&self) -> String {
        self.file_name.chars().take(MAX_CAPTION_LEN).collect()
    }
}

/// Where a relayed file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedFile {
    pub file_id: String,
    pub message_id: i64,
    /// Method that finally accepted the file
    pub kind: MediaKind,
}

/// Storage backend seen by the HTTP layer
#[async_trait]
pub trait MediaRelay: Send + Sync {
    /// Post a file to the channel
    async fn upload(&self, file: OutgoingFile) -> Result<RelayedFile>;

    /// Resolve a fresh download URL for a stored file
    async fn resolve_url(&self, file_id: &str) -> Result<String>;

    /// Remove the channel message holding a file
    async fn delete(&self, message_id: i64) -> Result<()>;

    /// Check the credentials and report who we are
    async fn check(&self) -> Result<BotIdentity>;
}
