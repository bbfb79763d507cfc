//! Media routing
//!
//! Telegram handles photos, videos and documents through different send
//! methods with different size caps. Files too big for the photo or video
//! path go out as documents.

use crate::config::UploadConfig;
use serde::{Deserialize, Serialize};

/// Bot API send method a file is relayed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    /// Bot API method name
    pub fn method(&self) -> &'static str {
        match self {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Video => "sendVideo",
            MediaKind::Document => "sendDocument",
        }
    }

    /// Multipart field carrying the file
    pub fn field(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }
}

/// Coarse type recorded for a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Document,
}

impl FileKind {
    pub fn from_mime(mime_type: &str) -> Self {
        let mime_type = mime_type.to_ascii_lowercase();
        if mime_type.starts_with("image/") {
            FileKind::Image
        } else if mime_type.starts_with("video/") {
            FileKind::Video
        } else {
            FileKind::Document
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Document => "document",
        }
    }
}

/// Size caps for the photo and video send paths
#[derive(Debug, Clone, Copy)]
pub struct MediaLimits {
    pub photo: u64,
    pub video: u64,
}

impl From<&UploadConfig> for MediaLimits {
    fn from(config: &UploadConfig) -> Self {
        MediaLimits {
            photo: config.photo_size_limit,
            video: config.video_size_limit,
        }
    }
}

/// Pick the send method for a file
pub fn route_media(mime_type: &str, size: u64, limits: MediaLimits) -> MediaKind {
    match FileKind::from_mime(mime_type) {
        FileKind::Image if size <= limits.photo => MediaKind::Photo,
        FileKind::Video if size <= limits.video => MediaKind::Video,
        _ => MediaKind::Document,
    }
}

/// Fallback for a missing or blank content type
pub fn normalize_mime(mime_type: Option<&str>) -> String {
    match mime_type.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
