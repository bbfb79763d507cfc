//! A single chunked upload in progress

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Bytes accumulated for one client-generated session id
///
/// Slots are pre-sized to `total_chunks`, so reassembly order is the slot
/// order no matter in which order chunks arrive.
#[derive(Debug)]
pub struct UploadSession {
    pub file_name: String,
    /// Size the client declared up front
    pub file_size: u64,
    pub mime_type: String,
    slots: Vec<Option<Bytes>>,
    received: u32,
    received_bytes: u64,
    last_activity: Instant,
}

/// How far along a session is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub received: u32,
    pub total: u32,
    /// Rounded to the nearest whole percent
    pub percent: u32,
}

/// Reassembled file, ready to relay
#[derive(Debug, Clone)]
pub struct AssembledFile {
    pub file_name: String,
    pub mime_type: String,
    pub declared_size: u64,
    pub data: Bytes,
}

impl UploadSession {
    pub fn new(
        total_chunks: u32,
        file_name: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
        now: Instant,
    ) -> Self {
        UploadSession {
            file_name: file_name.into(),
            file_size,
            mime_type: mime_type.into(),
            slots: vec![None; total_chunks as usize],
            received: 0,
            received_bytes: 0,
            last_activity: now,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total_chunks()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Store a chunk at its index
    ///
    /// A repeated index replaces the earlier bytes without counting twice.
    pub fn insert(&mut self, index: u32, data: Bytes, byte_limit: u64, now: Instant) -> Result<()> {
        let total = self.total_chunks();
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or_else(|| {
                Error::InvalidChunk(format!("chunk index {} out of range 0..{}", index, total))
            })?;

        let replaced = slot.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let new_total = self.received_bytes - replaced + data.len() as u64;
        if new_total > byte_limit {
            return Err(Error::PayloadTooLarge {
                size: new_total,
                limit: byte_limit,
            });
        }

        if slot.replace(data).is_none() {
            self.received += 1;
        }
        self.received_bytes = new_total;
        self.last_activity = now;

        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let total = self.total_chunks();
        let percent = if total == 0 {
            0
        } else {
            ((self.received as f64 / total as f64) * 100.0).round() as u32
        };

        Progress {
            received: self.received,
            total,
            percent,
        }
    }

    /// Concatenate every slot in index order
    pub fn assemble(self) -> Result<AssembledFile> {
        if !self.is_complete() {
            return Err(Error::InvalidChunk(format!(
                "session has {} of {} chunks",
                self.received,
                self.total_chunks()
            )));
        }

        let mut data = BytesMut::with_capacity(self.received_bytes as usize);
        for (index, slot) in self.slots.into_iter().enumerate() {
            let chunk = slot.ok_or_else(|| {
                Error::Internal(format!("chunk {} missing from a complete session", index))
            })?;
            data.extend_from_slice(&chunk);
        }

        Ok(AssembledFile {
            file_name: self.file_name,
            mime_type: self.mime_type,
            declared_size: self.file_size,
            data: data.freeze(),
        })
    }
}

impl AssembledFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
