//! Shared application state

use crate::cache::LinkCache;
use crate::chunk::{SessionLimits, SessionRegistry};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{content_hash, FileRecord, NewFileRecord, RecordStore};
use crate::share::{generate_token, TokenSource};
use crate::telegram::{MediaLimits, MediaRelay, OutgoingFile};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handles cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RecordStore>,
    pub relay: Arc<dyn MediaRelay>,
    pub sessions: Arc<SessionRegistry>,
    pub links: Arc<LinkCache>,
    tokens: TokenSource,
}

impl AppState {
    pub fn new(config: Config, store: RecordStore, relay: Arc<dyn MediaRelay>) -> Self {
        let sessions = SessionRegistry::new(SessionLimits::from(&config));
        let links = LinkCache::from_config(&config.cache);

        AppState {
            config: Arc::new(config),
            store: Arc::new(store),
            relay,
            sessions: Arc::new(sessions),
            links: Arc::new(links),
            tokens: generate_token,
        }
    }

    /// Replace the share token generator
    pub fn with_token_source(mut self, tokens: TokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn media_limits(&self) -> MediaLimits {
        MediaLimits::from(&self.config.upload)
    }

    /// Relay a file to the channel and record it under a fresh share token
    pub async fn store_file(&self, file: OutgoingFile) -> Result<FileRecord> {
        let hash = content_hash(&file.data);
        let size = file.size();
        let file_name = file.file_name.clone();
        let mime_type = file.mime_type.clone();

        let relayed = self.relay.upload(file).await?;

        let attempts = self.config.share.max_generation_attempts;
        for attempt in 1..=attempts {
            let token = (self.tokens)(self.config.share.link_length);
            let new = NewFileRecord {
                file_name: file_name.clone(),
                file_size: size,
                mime_type: mime_type.clone(),
                telegram_file_id: relayed.file_id.clone(),
                telegram_message_id: relayed.message_id,
                share_link: token,
                content_hash: hash.clone(),
            };

            match self.store.create(new) {
                Ok(record) => {
                    info!(
                        "Stored {} as {} (share link {})",
                        record.file_name, record.id, record.share_link
                    );
                    return Ok(record);
                }
                Err(Error::ShareLinkTaken(token)) => {
                    debug!("Share link {} taken (attempt {}/{})", token, attempt, attempts);
                }
                Err(err) => {
                    self.discard_message(relayed.message_id).await;
                    return Err(err);
                }
            }
        }

        self.discard_message(relayed.message_id).await;
        Err(Error::ShareLinkExhausted(attempts))
    }

    /// Best-effort removal of a channel message that has no record
    async fn discard_message(&self, message_id: i64) {
        if let Err(e) = self.relay.delete(message_id).await {
            warn!("Could not remove orphaned message {}: {}", message_id, e);
        }
    }

    /// Fresh download URL, served from the link cache when possible
    pub async fn resolve_url(&self, record: &FileRecord) -> Result<String> {
        if let Some(url) = self.links.get(&record.telegram_file_id) {
            debug!("Link cache hit for {}", record.id);
            return Ok(url);
        }

        let url = self.relay.resolve_url(&record.telegram_file_id).await?;
        self.links.insert(&record.telegram_file_id, url.clone());
        Ok(url)
    }

    /// Delete a record, and the channel message when configured to
    pub async fn delete_file(&self, id: &str) -> Result<FileRecord> {
        let record = self
            .store
            .delete(id)?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;

        self.links.invalidate(&record.telegram_file_id);

        if self.config.telegram.delete_remote {
            if let Err(e) = self.relay.delete(record.telegram_message_id).await {
                warn!(
                    "Deleted record {} but not message {}: {}",
                    record.id, record.telegram_message_id, e
                );
            }
        }

        info!("Deleted {} ({})", record.id, record.file_name);
        Ok(record)
    }
}
