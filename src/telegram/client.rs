//! Bot API client
//!
//! Talks to `https://api.telegram.org/bot<token>/<method>` with reqwest.
//! Uploads go through the rate limiter. Calls are retried with exponential
//! backoff on flood control and server errors, and on transport failures
//! when repeating the request cannot post the same message twice.

use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::telegram::rate_limit::{ExponentialBackoff, RateLimiter};
use crate::telegram::types::{ApiResponse, BotIdentity, Message, TelegramFile};
use crate::telegram::{MediaKind, MediaRelay, OutgoingFile, RelayedFile};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a single HTTP round trip
enum Attempt<T> {
    Done(T),
    /// Worth repeating, after at least the given wait
    Retry(Error, Duration),
}

/// Telegram Bot API backend
pub struct BotClient {
    http: reqwest::Client,
    config: TelegramConfig,
    upload_limiter: RateLimiter,
}

impl BotClient {
    /// Create a new client
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let upload_limiter =
            RateLimiter::new(config.max_concurrent_uploads, config.uploads_per_second);

        Ok(BotClient {
            http,
            config,
            upload_limiter,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            file_path.trim_start_matches('/')
        )
    }

    /// Call a Bot API method, retrying transient failures
    async fn call<T, F>(&self, method: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> Result<RequestBuilder>,
    {
        let mut backoff =
            ExponentialBackoff::new(self.config.retry_base_delay_ms, self.config.retry_attempts);

        loop {
            let request = build(self.http.post(self.api_url(method)))?;

            match self.attempt(method, request).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(err, floor) => match backoff.next_delay_at_least(floor) {
                    Some(delay) => {
                        warn!(
                            "{} failed (attempt {}): {}, retrying in {:?}",
                            method,
                            backoff.attempts(),
                            err,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!("{} failed after {} retries: {}", method, backoff.attempts(), err);
                        return Err(err);
                    }
                },
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<Attempt<T>> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = Error::Http(e);
                let retry = if posts_message(method) {
                    err.is_retryable_send()
                } else {
                    err.is_retryable()
                };
                if retry {
                    return Ok(Attempt::Retry(err, Duration::ZERO));
                }
                return Err(err);
            }
        };

        let status = response.status();
        let envelope: ApiResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_server_error() => {
                return Ok(Attempt::Retry(Error::Http(e), Duration::ZERO));
            }
            Err(e) => {
                return Err(Error::Telegram(format!("Unexpected response ({}): {}", status, e)));
            }
        };

        if envelope.ok {
            return envelope
                .result
                .map(Attempt::Done)
                .ok_or_else(|| Error::Telegram("Response is missing a result".to_string()));
        }

        let err = Error::TelegramApi {
            code: envelope.error_code.unwrap_or_else(|| status.as_u16()),
            description: envelope
                .description
                .unwrap_or_else(|| status.to_string()),
        };

        let retry_after = envelope
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);

        if let Some(wait) = retry_after {
            self.upload_limiter.penalize(wait);
            debug!(
                "Flood control on {}, upload spacing now {:?}",
                method,
                self.upload_limiter.spacing()
            );
        }

        if err.is_retryable() {
            Ok(Attempt::Retry(err, retry_after.unwrap_or_default()))
        } else {
            Err(err)
        }
    }

    /// Post a file through one specific send method
    async fn send_media(&self, file: &OutgoingFile, kind: MediaKind) -> Result<RelayedFile> {
        let _guard = self.upload_limiter.acquire().await?;

        debug!("{} {} ({} bytes)", kind.method(), file.file_name, file.size());

        let message: Message = self
            .call(kind.method(), |request| {
                let form = Form::new()
                    .text("chat_id", self.config.channel_id.clone())
                    .text("caption", file.caption())
                    .part(kind.field(), media_part(file));
                Ok(request.multipart(form))
            })
            .await?;

        self.upload_limiter.reset();

        let file_id = message
            .file_id()
            .ok_or_else(|| Error::Telegram(format!("{} response carried no file", kind.method())))?
            .to_string();

        Ok(RelayedFile {
            file_id,
            message_id: message.message_id,
            kind,
        })
    }
}

/// Whether a method posts a new message to the channel
fn posts_message(method: &str) -> bool {
    method.starts_with("send")
}

/// Multipart part for the file body
fn media_part(file: &OutgoingFile) -> Part {
    let part = || {
        Part::stream_with_length(Body::from(file.data.clone()), file.size())
            .file_name(file.file_name.clone())
    };

    match part().mime_str(&file.mime_type) {
        Ok(part) => part,
        Err(_) => {
            debug!("Unparseable content type {:?}, sending without one", file.mime_type);
            part()
        }
    }
}

#[async_trait]
impl MediaRelay for BotClient {
    async fn upload(&self, file: OutgoingFile) -> Result<RelayedFile> {
        let relayed = match self.send_media(&file, file.kind).await {
            Ok(relayed) => relayed,
            // Photos and videos Telegram refuses to process are kept as documents
            Err(err @ Error::TelegramApi { code: 400, .. }) if file.kind != MediaKind::Document => {
                warn!(
                    "{} rejected {}: {}, retrying as document",
                    file.kind.method(),
                    file.file_name,
                    err
                );
                self.send_media(&file, MediaKind::Document).await?
            }
            Err(err) => return Err(err),
        };

        info!(
            "Relayed {} as message {} via {}",
            file.file_name,
            relayed.message_id,
            relayed.kind.method()
        );
        Ok(relayed)
    }

    async fn resolve_url(&self, file_id: &str) -> Result<String> {
        let file: TelegramFile = self
            .call("getFile", |request| Ok(request.json(&json!({ "file_id": file_id }))))
            .await?;

        let path = file.file_path.ok_or_else(|| {
            Error::Telegram(format!(
                "File {} is too large to download through the Bot API",
                file.file_id
            ))
        })?;

        Ok(self.file_url(&path))
    }

    async fn delete(&self, message_id: i64) -> Result<()> {
        let deleted: bool = self
            .call("deleteMessage", |request| {
                Ok(request.json(&json!({
                    "chat_id": self.config.channel_id,
                    "message_id": message_id,
                })))
            })
            .await?;

        if !deleted {
            return Err(Error::Telegram(format!("Message {} was not deleted", message_id)));
        }

        debug!("Deleted message {}", message_id);
        Ok(())
    }

    async fn check(&self) -> Result<BotIdentity> {
        self.call("getMe", Ok).await
    }
}
