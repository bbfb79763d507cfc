//! Stored file records

use crate::telegram::FileKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata kept for every relayed file
///
/// Serialized camelCase for API clients and with bincode in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: FileKind,
    pub mime_type: String,
    /// Telegram file id used to resolve download URLs
    pub telegram_file_id: String,
    /// Channel message holding the file
    pub telegram_message_id: i64,
    /// Share token (not the full URL)
    pub share_link: String,
    /// BLAKE3 of the uploaded bytes, hex encoded
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Everything needed to create a record; id and timestamp are assigned by the store
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub telegram_file_id: String,
    pub telegram_message_id: i64,
    pub share_link: String,
    pub content_hash: String,
}

impl NewFileRecord {
    pub fn into_record(self, id: String, uploaded_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id,
            file_type: FileKind::from_mime(&self.mime_type),
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            telegram_file_id: self.telegram_file_id,
            telegram_message_id: self.telegram_message_id,
            share_link: self.share_link,
            content_hash: self.content_hash,
            uploaded_at,
        }
    }
}

/// Hex BLAKE3 digest recorded as `contentHash`
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
