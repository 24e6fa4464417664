//! Commit pipeline for a log-structured key-value storage engine.
//!
//! This crate implements the subsystem that admits write batches, assigns
//! them monotonic sequence numbers, durably appends them to a write-ahead
//! log, applies them to an in-memory table, and publishes their effects
//! atomically to readers — the piece of such an engine that has to
//! simultaneously guarantee a total order, WAL-before-visible durability,
//! pipelined concurrent commits, and correct publication under out-of-order
//! writer completions.
//!
//! The broader engine (on-disk sorted tables, compaction, the read/iterator
//! path) is out of scope and treated as an external collaborator: the
//! pipeline only calls through the [`CommitEnvironment`] trait. This crate
//! does ship one concrete implementation of that trait, in
//! [`reference_env`], built from a reference WAL journal ([`wal`]) and an
//! in-memory memtable ([`memtable`]) — not because the pipeline depends on
//! them, but so the pipeline can be exercised and tested end-to-end as a
//! complete crate rather than against a hand-written test double only.
//!
//! ```
//! use std::sync::Arc;
//! use strata_commit::{Batch, CommitPipeline};
//! use strata_commit::reference_env::{batch_from_ops, Op, ReferenceEnvironment};
//! use strata_commit::wal::{MemoryBackend, WALConfig};
//!
//! let env = ReferenceEnvironment::new(Arc::new(MemoryBackend::new()), WALConfig::default())
//!     .expect("open reference environment");
//! let pipeline = CommitPipeline::new(env);
//!
//! let batch = Arc::new(batch_from_ops(&[Op::Put {
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }]));
//! pipeline.commit(batch, true).expect("commit");
//!
//! assert_eq!(pipeline.visible_seq_num(), 1);
//! ```

mod batch;
mod environment;
mod error;
mod pipeline;
mod queue;
mod semaphore;
mod sequence;

pub mod memtable;
pub mod reference_env;
pub mod wal;

pub use batch::Batch;
pub use environment::CommitEnvironment;
pub use error::{BoxedError, PipelineError, Result};
pub use pipeline::{CommitPipeline, PipelineConfig};
