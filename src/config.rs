//! Configuration management for tgshare

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Default upload limit: 50MB (Bot API cap for multipart uploads)
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Largest image still sent through sendPhoto
pub const DEFAULT_PHOTO_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// Largest video still sent through sendVideo
pub const DEFAULT_VIDEO_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

/// Chunked sessions idle longer than this are dropped
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 60 * 60;

/// How often the session sweeper runs
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Chunked sessions open at once
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Bytes all open chunked sessions may hold together: 512MB
pub const DEFAULT_MAX_BUFFERED_BYTES: u64 = 512 * 1024 * 1024;

/// Default share token length
pub const DEFAULT_LINK_LENGTH: usize = 8;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram Bot API configuration
    pub telegram: TelegramConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Upload handling configuration
    pub upload: UploadConfig,

    /// Share link configuration
    pub share: ShareConfig,

    /// Resolved download URL cache
    pub cache: CacheConfig,

    /// Record storage configuration
    pub storage: StorageConfig,
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,

    /// Target channel: numeric id (-100...) or @username
    pub channel_id: String,

    /// Bot API base URL (point at a local Bot API server to lift size caps)
    pub api_base: String,

    /// Maximum concurrent uploads
    pub max_concurrent_uploads: usize,

    /// Target upload rate
    pub uploads_per_second: f64,

    /// Retry attempts for failed operations
    pub retry_attempts: u32,

    /// Base delay for exponential backoff (ms)
    pub retry_base_delay_ms: u64,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Delete the channel message when a record is deleted
    pub delete_remote: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Public base URL used in share links (derived from the request if unset)
    pub public_url: Option<String>,

    /// Maximum size of a single uploaded file in bytes
    pub max_upload_size: u64,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub session_idle_timeout_secs: u64,

    pub sweep_interval_secs: u64,

    /// Upper bound on totalChunks for one session
    pub max_chunks: u32,

    /// Chunked sessions that may be open at once
    pub max_sessions: usize,

    /// Bytes all open sessions may buffer together
    pub max_buffered_bytes: u64,

    pub photo_size_limit: u64,

    pub video_size_limit: u64,
}

/// Share link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub link_length: usize,

    /// Tokens tried before giving up on a collision
    pub max_generation_attempts: u32,
}

/// Download URL cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 0 disables caching
    pub link_ttl_secs: u64,

    pub max_entries: usize,
}

/// Record storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Path to the data directory
    pub data_dir: PathBuf,
}

/// Where file records live
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// On-disk sled database under `data_dir`
    Sled,
    /// Temporary database, lost on restart
    Memory,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            telegram: TelegramConfig::default(),
            server: ServerConfig::default(),
            upload: UploadConfig::default(),
            share: ShareConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            bot_token: String::new(),
            channel_id: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_concurrent_uploads: 3,
            uploads_per_second: 1.0,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 300,
            delete_remote: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_url: None,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_chunks: 10_000,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            photo_size_limit: DEFAULT_PHOTO_SIZE_LIMIT,
            video_size_limit: DEFAULT_VIDEO_SIZE_LIMIT,
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        ShareConfig {
            link_length: DEFAULT_LINK_LENGTH,
            max_generation_attempts: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            link_ttl_secs: 50 * 60, // Bot API links live at least an hour
            max_entries: 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sled,
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tgshare"),
        }
    }
}

impl StorageConfig {
    /// Location of the sled database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Sled => "sled",
            StorageBackend::Memory => "memory",
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }

        if let Some(channel) = non_empty_env("TELEGRAM_CHANNEL_ID") {
            self.telegram.channel_id = channel;
        }

        if let Some(base) = non_empty_env("TELEGRAM_API_BASE") {
            self.telegram.api_base = base;
        }

        if let Some(host) = non_empty_env("TGSHARE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = non_empty_env("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Some(url) = non_empty_env("TGSHARE_PUBLIC_URL") {
            self.server.public_url = Some(url);
        }

        if let Some(size) = non_empty_env("TGSHARE_MAX_UPLOAD_SIZE") {
            if let Ok(size) = size.parse::<u64>() {
                self.server.max_upload_size = size;
            }
        }

        if let Some(dir) = non_empty_env("TGSHARE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(backend) = non_empty_env("TGSHARE_STORAGE") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "sled" => self.storage.backend = StorageBackend::Sled,
                _ => {}
            }
        }
    }

    /// Create a new config from environment variables only (no config file)
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();

        if config.telegram.bot_token.is_empty() {
            return Err(Error::InvalidConfig(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if config.telegram.channel_id.is_empty() {
            return Err(Error::InvalidConfig(
                "TELEGRAM_CHANNEL_ID environment variable is required".to_string(),
            ));
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Telegram bot token is required".to_string(),
            ));
        }

        validate_channel_id(&self.telegram.channel_id)?;

        if self.server.max_upload_size == 0 {
            return Err(Error::InvalidConfig(
                "Maximum upload size must be greater than 0".to_string(),
            ));
        }

        if !(4..=32).contains(&self.share.link_length) {
            return Err(Error::InvalidConfig(
                "Share link length must be between 4 and 32".to_string(),
            ));
        }

        if self.share.max_generation_attempts == 0 {
            return Err(Error::InvalidConfig(
                "Share link generation needs at least one attempt".to_string(),
            ));
        }

        if self.upload.session_idle_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Session idle timeout must be greater than 0".to_string(),
            ));
        }

        if self.upload.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "Sweep interval must be greater than 0".to_string(),
            ));
        }

        if self.upload.max_chunks == 0 {
            return Err(Error::InvalidConfig(
                "Maximum chunk count must be greater than 0".to_string(),
            ));
        }

        if self.upload.max_sessions == 0 {
            return Err(Error::InvalidConfig(
                "Maximum upload session count must be greater than 0".to_string(),
            ));
        }

        if self.upload.max_buffered_bytes < self.server.max_upload_size {
            return Err(Error::InvalidConfig(
                "Upload buffer must hold at least one file of the maximum upload size".to_string(),
            ));
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Sled {
            std::fs::create_dir_all(&self.storage.data_dir)?;
        }
        Ok(())
    }
}

/// Channel ids are either numeric (`-1001234567890`) or `@username`
pub fn validate_channel_id(channel_id: &str) -> Result<()> {
    let channel_id = channel_id.trim();

    if channel_id.is_empty() {
        return Err(Error::InvalidConfig(
            "Telegram channel id is required".to_string(),
        ));
    }

    if channel_id.starts_with("http://") || channel_id.starts_with("https://") {
        return Err(Error::InvalidConfig(
            "Telegram channel id should not be a URL. Use the numeric channel id \
             (e.g., -1001234567890) or username format (e.g., @channelname)"
                .to_string(),
        ));
    }

    let pattern = Regex::new(r"^(-?\d+|@[A-Za-z][A-Za-z0-9_]{3,31})$")
        .map_err(|e| Error::Internal(e.to_string()))?;
    if !pattern.is_match(channel_id) {
        return Err(Error::InvalidConfig(format!(
            "Unrecognised Telegram channel id '{}': expected -100... or @channelname",
            channel_id
        )));
    }

    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
