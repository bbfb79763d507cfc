//! Chunked upload reassembly
//!
//! Large files arrive as a series of base64 chunks posted under a
//! client-generated session id. Chunks are slotted by index into a
//! pre-sized buffer; once every slot is filled the session is removed and
//! its bytes concatenated in index order. Sessions that stop receiving
//! chunks are evicted by a periodic sweep.

mod registry;
mod session;
mod sweeper;

pub use registry::{ChunkOutcome, ChunkUpload, SessionLimits, SessionRegistry};
pub use session::{AssembledFile, Progress, UploadSession};
pub use sweeper::Sweeper;
