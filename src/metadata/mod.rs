//! File record metadata
//!
//! Each relayed file gets one [`FileRecord`]: what it is, where it lives in
//! the channel and the share token that points at it.

mod record;
mod store;

pub use record::{content_hash, FileRecord, NewFileRecord};
pub use store::RecordStore;
