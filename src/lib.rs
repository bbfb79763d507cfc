//! tgshare - media sharing backed by a Telegram channel
//!
//! Uploaded files are relayed by a bot into a Telegram channel, which acts
//! as the object store. Each file gets a short share link that resolves to
//! a fresh Telegram download URL on every visit. Large files can be sent
//! in base64 chunks and are reassembled in memory before relaying.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod metadata;
pub mod server;
pub mod share;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::metadata::{FileRecord, RecordStore};
    pub use crate::server::AppState;
    pub use crate::telegram::{BotClient, MediaRelay};
}
