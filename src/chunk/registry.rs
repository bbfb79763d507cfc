//! In-memory map of chunked upload sessions

use crate::chunk::session::{AssembledFile, Progress, UploadSession};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::telegram::normalize_mime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use dashmap::DashMap;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One chunk as posted by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpload {
    pub session_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Base64 encoded chunk bytes
    pub chunk_data: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ChunkUpload {
    /// Decode the chunk body, tolerating a `data:` URL prefix
    pub fn decode(&self) -> Result<Bytes> {
        let encoded = match self.chunk_data.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => self.chunk_data.as_str(),
        };

        STANDARD
            .decode(encoded.trim())
            .map(Bytes::from)
            .map_err(|e| {
                Error::InvalidChunk(format!(
                    "chunk {} is not valid base64: {}",
                    self.chunk_index, e
                ))
            })
    }
}

/// Result of accepting a chunk
#[derive(Debug)]
pub enum ChunkOutcome {
    Progress(Progress),
    Complete(AssembledFile),
}

/// Bounds applied to every session
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_chunks: u32,
    pub max_upload_size: u64,
    pub idle_timeout: Duration,
    pub max_sessions: usize,
    /// Combined bytes every open session may hold
    pub max_buffered_bytes: u64,
}

impl From<&Config> for SessionLimits {
    fn from(config: &Config) -> Self {
        SessionLimits {
            max_chunks: config.upload.max_chunks,
            max_upload_size: config.server.max_upload_size,
            idle_timeout: Duration::from_secs(config.upload.session_idle_timeout_secs),
            max_sessions: config.upload.max_sessions,
            max_buffered_bytes: config.upload.max_buffered_bytes,
        }
    }
}

/// Sessions keyed by client-generated id
///
/// Ids of assembled sessions are kept until the idle timeout passes, so a
/// retried final chunk is refused instead of opening a new session.
pub struct SessionRegistry {
    sessions: DashMap<String, UploadSession>,
    completed: DashMap<String, Instant>,
    limits: SessionLimits,
}

impl SessionRegistry {
    pub fn new(limits: SessionLimits) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            completed: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Accept a chunk, returning the reassembled file once the last one lands
    pub fn accept(&self, chunk: &ChunkUpload) -> Result<ChunkOutcome> {
        self.accept_at(chunk, Instant::now())
    }

    pub fn accept_at(&self, chunk: &ChunkUpload, now: Instant) -> Result<ChunkOutcome> {
        self.validate(chunk)?;
        let data = chunk.decode()?;

        if self.completed.contains_key(&chunk.session_id) {
            return Err(Error::SessionCompleted(chunk.session_id.clone()));
        }
        self.check_capacity(&chunk.session_id, data.len() as u64)?;

        debug!(
            "Chunk {}/{} for session {} ({} bytes)",
            chunk.chunk_index + 1,
            chunk.total_chunks,
            chunk.session_id,
            data.len()
        );

        {
            let mut session = self.sessions.entry(chunk.session_id.clone()).or_insert_with(|| {
                UploadSession::new(
                    chunk.total_chunks,
                    chunk.file_name.clone(),
                    chunk.file_size,
                    normalize_mime(chunk.mime_type.as_deref()),
                    now,
                )
            });

            if session.total_chunks() != chunk.total_chunks {
                return Err(Error::SessionMismatch(format!(
                    "session {} expects {} chunks, got totalChunks {}",
                    chunk.session_id,
                    session.total_chunks(),
                    chunk.total_chunks
                )));
            }

            let inserted =
                session.insert(chunk.chunk_index, data, self.limits.max_upload_size, now);
            match inserted {
                Ok(()) => {}
                Err(err @ Error::PayloadTooLarge { .. }) => {
                    drop(session);
                    self.sessions.remove(&chunk.session_id);
                    info!("Dropped session {}: {}", chunk.session_id, err);
                    return Err(err);
                }
                Err(err) => return Err(err),
            }

            if !session.is_complete() {
                return Ok(ChunkOutcome::Progress(session.progress()));
            }
        }

        // The map guard is released above; removing under it would deadlock
        let (_, session) = self
            .sessions
            .remove_if(&chunk.session_id, |_, s| s.is_complete())
            .ok_or_else(|| Error::SessionNotFound(chunk.session_id.clone()))?;
        self.completed.insert(chunk.session_id.clone(), now);

        info!(
            "All {} chunks received for {} ({} bytes), assembling",
            session.total_chunks(),
            session.file_name,
            session.received_bytes()
        );

        session.assemble().map(ChunkOutcome::Complete)
    }

    fn validate(&self, chunk: &ChunkUpload) -> Result<()> {
        if chunk.session_id.trim().is_empty() {
            return Err(Error::InvalidChunk("sessionId is required".to_string()));
        }
        if chunk.total_chunks == 0 {
            return Err(Error::InvalidChunk("totalChunks must be at least 1".to_string()));
        }
        if chunk.total_chunks > self.limits.max_chunks {
            return Err(Error::InvalidChunk(format!(
                "totalChunks {} exceeds the limit of {}",
                chunk.total_chunks, self.limits.max_chunks
            )));
        }
        if chunk.chunk_index >= chunk.total_chunks {
            return Err(Error::InvalidChunk(format!(
                "chunkIndex {} out of range 0..{}",
                chunk.chunk_index, chunk.total_chunks
            )));
        }
        if chunk.file_size > self.limits.max_upload_size {
            return Err(Error::PayloadTooLarge {
                size: chunk.file_size,
                limit: self.limits.max_upload_size,
            });
        }
        Ok(())
    }

    /// Refuse a chunk that would open one session too many or push the
    /// buffered total past its budget
    fn check_capacity(&self, session_id: &str, incoming: u64) -> Result<()> {
        let open = self.sessions.len();
        if open >= self.limits.max_sessions && !self.sessions.contains_key(session_id) {
            return Err(Error::UploadCapacity(format!(
                "{} upload sessions already open",
                open
            )));
        }

        let buffered: u64 = self.sessions.iter().map(|s| s.received_bytes()).sum();
        if buffered.saturating_add(incoming) > self.limits.max_buffered_bytes {
            return Err(Error::UploadCapacity(format!(
                "{} bytes already buffered, limit is {}",
                buffered, self.limits.max_buffered_bytes
            )));
        }

        Ok(())
    }

    /// Abort a session
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Evict sessions idle longer than the timeout
    pub fn sweep(&self, now: Instant) -> usize {
        let timeout = self.limits.idle_timeout;
        let before = self.sessions.len();

        self.sessions.retain(|id, session| {
            let idle = session.idle_for(now);
            if idle > timeout {
                info!(
                    "Evicting upload session {} ({}/{} chunks, idle {}s)",
                    id,
                    session.received(),
                    session.total_chunks(),
                    idle.as_secs()
                );
                false
            } else {
                true
            }
        });

        self.completed
            .retain(|_, completed_at| now.saturating_duration_since(*completed_at) <= timeout);

        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

}
