//! Content-addressed, append-only reasoning-trail capture for one unit of
//! work (one connector run, one enrichment sweep). See `SessionHandle` for
//! the write path and `EngramStore` for open/close/verify.

pub mod content;
pub mod error;
pub mod handle;
pub mod index;
pub mod store;
pub mod store_facade;

pub use content::{canonical_bytes, content_address, RecordEntry, SessionDocument, SessionOutcome};
pub use error::EngramError;
pub use handle::{SessionDropped, SessionHandle, MAX_BUFFERED_RECORDS};
pub use index::{SessionIndex, SessionSummary};
pub use store::{FilesystemObjectStore, ObjectStore};
pub use store_facade::EngramStore;
