//! Relational storage (§4.2 C2): file records, fast/deep chunk snapshots,
//! folders, memory records, and BM25/FTS5 keyword search, all on top of
//! SQLite.

mod chunks;
mod connection;
mod error;
mod files;
mod folders;
mod memory;

pub use chunks::KeywordHit;
pub use connection::{Storage, StorageCounts};
pub use error::{Result, StorageError};
pub use folders::Folder;
pub use memory::{new_memory_id, now as memory_now};
