//! Reference write-ahead log used to exercise the commit pipeline.
//!
//! The pipeline itself is oblivious to this module: it only calls through
//! the `CommitEnvironment` trait. This is one concrete implementation of the
//! durability half of that contract, providing:
//! - buffered, CRC32-checked, length-prefixed append,
//! - leader-based group commit for fsync coalescing,
//! - truncation, for the (recovery-adjacent, but out of this crate's scope)
//!   case of resetting the log after a snapshot.

pub mod backend;
pub mod config;
pub mod journal;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use config::WALConfig;
pub use journal::WALJournal;
