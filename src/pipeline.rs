use std::sync::{Arc, Mutex};

use crate::batch::Batch;
use crate::environment::CommitEnvironment;
use crate::error::{PipelineError, Result};
use crate::queue::CommitQueue;
use crate::semaphore::CommitSemaphore;
use crate::sequence::SequenceAllocator;

/// Tuning constants for a `CommitPipeline`.
///
/// This is the only configuration surface this subsystem owns: a
/// constructor argument, not a config file or environment variable.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of batches simultaneously in the write+apply stage.
    /// Bounds memtable pressure and caps the WAL writer's group-sync
    /// coalescing window. The commit queue itself is an unbounded
    /// `VecDeque`, so there is no separate capacity to keep in sync with
    /// this value (see the commit queue's design notes).
    pub commit_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_concurrency: 64,
        }
    }
}

/// Orchestrates the commit pipeline's five stages: prepare, write, apply,
/// publish, return.
///
/// Runs no background worker; every batch is pushed through all stages by
/// its submitting thread. Safe to share across threads (`Commit` and
/// `AllocateSeqNum` take `&self`).
pub struct CommitPipeline<E: CommitEnvironment> {
    env: E,
    sequence: SequenceAllocator,
    queue: CommitQueue,
    admission: CommitSemaphore,
    prepare_lock: Mutex<()>,
    publish_lock: Mutex<()>,
}

impl<E: CommitEnvironment> CommitPipeline<E> {
    /// Constructs a pipeline over `env` using the default configuration.
    pub fn new(env: E) -> Self {
        Self::with_config(env, PipelineConfig::default())
    }

    /// Constructs a pipeline over `env` with an explicit configuration.
    pub fn with_config(env: E, config: PipelineConfig) -> Self {
        Self {
            env,
            sequence: SequenceAllocator::new(),
            queue: CommitQueue::new(),
            admission: CommitSemaphore::new(config.commit_concurrency),
            prepare_lock: Mutex::new(()),
            publish_lock: Mutex::new(()),
        }
    }

    /// Borrows the environment this pipeline was constructed over.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Last sequence number handed out to any batch so far.
    pub fn log_seq_num(&self) -> u64 {
        self.sequence.log_seq_num()
    }

    /// Largest sequence number whose batch (and all earlier ones) has been
    /// applied and is visible to readers.
    pub fn visible_seq_num(&self) -> u64 {
        self.sequence.visible_seq_num()
    }

    /// Admits, sequences, writes, applies, and publishes `batch`.
    ///
    /// If `sync` is requested, does not return until the WAL fsync covering
    /// this batch's record has completed.
    pub fn commit(&self, batch: Arc<Batch>, sync: bool) -> Result<()> {
        let _permit = self.admission.acquire();

        // --- Prepare ---
        {
            let _prepare_guard = self.prepare_lock.lock().unwrap();
            let first_seq = self.sequence.reserve(batch.count());
            batch.set_seq_num(first_seq);
            self.queue.enqueue(Arc::clone(&batch));
        }

        // --- Write ---
        let memtable = match self.env.write(&batch, sync) {
            Ok(memtable) => memtable,
            Err(e) => {
                // The batch never reached the WAL; there is nothing to sync.
                // Still mark it applied so the commit queue cannot stall,
                // and still run publication so later batches aren't blocked
                // behind this one forever.
                #[cfg(feature = "logging")]
                log::warn!("commit write failed for seq {}: {e}", batch.seq_num());
                batch.mark_applied();
                self.publish();
                return Err(PipelineError::Write(e));
            }
        };

        // --- Apply ---
        let apply_result = self.env.apply(&batch, &memtable);
        batch.mark_applied();
        self.publish();

        match apply_result {
            Ok(()) => {
                if sync {
                    batch
                        .wait_for_sync()
                        .map_err(PipelineError::Write)?;
                }
                Ok(())
            }
            Err(e) => {
                // The WAL record is already durable; honor a requested sync
                // wait regardless, then surface the apply error.
                #[cfg(feature = "logging")]
                log::warn!("commit apply failed for seq {}: {e}", batch.seq_num());
                if sync {
                    let _ = batch.wait_for_sync();
                }
                Err(PipelineError::Apply(e))
            }
        }
    }

    /// Reserves `count` sequence numbers without writing a real batch to the
    /// WAL.
    ///
    /// `prepare_fn` runs while holding the prepare lock, before any other
    /// commit may stamp its sequence numbers, so it can install
    /// preconditions (e.g. snapshot a memtable) atomically with respect to
    /// the sequence stream. `apply_fn` runs after publication, receiving the
    /// first sequence number reserved for this call. `count` of zero is
    /// coerced to one, so the returned sequence number is never zero.
    pub fn allocate_seq_num(
        &self,
        count: u64,
        prepare_fn: impl FnOnce(),
        apply_fn: impl FnOnce(u64),
    ) -> Result<u64> {
        let _permit = self.admission.acquire();

        let sentinel = {
            let _prepare_guard = self.prepare_lock.lock().unwrap();
            prepare_fn();
            let count = count.max(1);
            let first_seq = self.sequence.reserve(count);
            let sentinel = Arc::new(Batch::sentinel(count as u32));
            sentinel.set_seq_num(first_seq);
            self.queue.enqueue(Arc::clone(&sentinel));
            sentinel
        };

        let first_seq = sentinel.seq_num();

        if let Err(e) = self.env.write(&sentinel, false) {
            #[cfg(feature = "logging")]
            log::warn!("allocate_seq_num write failed for seq {first_seq}: {e}");
            sentinel.mark_applied();
            self.publish();
            return Err(PipelineError::Write(e));
        }
        sentinel.mark_applied();
        self.publish();

        apply_fn(first_seq);
        Ok(first_seq)
    }

    /// Drives the publish stage: dequeues the longest already-applied
    /// prefix of the commit queue, advancing `visible_seq_num` past each
    /// batch's range.
    fn publish(&self) {
        let _publish_guard = self.publish_lock.lock().unwrap();
        while let Some(batch) = self.queue.dequeue() {
            let last_seq = batch.seq_num() + batch.count() - 1;
            self.sequence.advance_visible_to(last_seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxedError;
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::sync::Mutex as StdMutex;

    /// Minimal in-process environment: "writes" and "applies" are just
    /// counters, with no real durability. Enough to exercise the pipeline's
    /// own stage orchestration without pulling in the reference WAL/memtable.
    struct CountingEnvironment {
        write_count: AtomicU64,
        applied: StdMutex<Vec<u64>>,
    }

    impl CountingEnvironment {
        fn new() -> Self {
            Self {
                write_count: AtomicU64::new(0),
                applied: StdMutex::new(Vec::new()),
            }
        }
    }

    impl CommitEnvironment for CountingEnvironment {
        type Memtable = ();

        fn write(&self, _batch: &Arc<Batch>, _sync: bool) -> Result<Arc<()>, BoxedError> {
            self.write_count.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(Arc::new(()))
        }

        fn apply(&self, batch: &Arc<Batch>, _memtable: &()) -> Result<(), BoxedError> {
            self.applied.lock().unwrap().push(batch.seq_num());
            Ok(())
        }
    }

    /// Environment whose `write` always fails, for exercising the
    /// forward-progress guarantee on a write error.
    struct FailingWriteEnvironment;

    impl CommitEnvironment for FailingWriteEnvironment {
        type Memtable = ();

        fn write(&self, _batch: &Arc<Batch>, _sync: bool) -> Result<Arc<()>, BoxedError> {
            Err("write always fails".into())
        }

        fn apply(&self, _batch: &Arc<Batch>, _memtable: &()) -> Result<(), BoxedError> {
            panic!("apply must not run after a write failure");
        }
    }

    #[test]
    fn single_commit_stamps_and_publishes() {
        let pipeline = CommitPipeline::new(CountingEnvironment::new());
        let batch = Arc::new(Batch::new(1, b"x"));
        pipeline.commit(Arc::clone(&batch), false).unwrap();

        assert_eq!(batch.seq_num(), 1);
        assert_eq!(pipeline.log_seq_num(), 1);
        assert_eq!(pipeline.visible_seq_num(), 1);
    }

    #[test]
    fn sequential_commits_reserve_contiguous_ranges() {
        let pipeline = CommitPipeline::new(CountingEnvironment::new());
        let a = Arc::new(Batch::new(3, b"aaa"));
        let b = Arc::new(Batch::new(2, b"bb"));
        pipeline.commit(Arc::clone(&a), false).unwrap();
        pipeline.commit(Arc::clone(&b), false).unwrap();

        assert_eq!(a.seq_num(), 1);
        assert_eq!(b.seq_num(), 4);
        assert_eq!(pipeline.log_seq_num(), 5);
        assert_eq!(pipeline.visible_seq_num(), 5);
    }

    #[test]
    fn write_failure_surfaces_and_still_publishes() {
        let pipeline = CommitPipeline::new(FailingWriteEnvironment);
        let batch = Arc::new(Batch::new(1, b"x"));
        let err = pipeline.commit(batch, false).unwrap_err();
        assert!(matches!(err, PipelineError::Write(_)));
        assert_eq!(pipeline.visible_seq_num(), 1, "a failed batch must still advance visible_seq_num");
    }

    #[test]
    fn allocate_seq_num_invokes_hooks_and_reserves_a_range() {
        let pipeline = CommitPipeline::new(CountingEnvironment::new());
        let prepared = Arc::new(StdMutex::new(false));
        let applied_seq = Arc::new(StdMutex::new(0u64));

        let prepared_clone = Arc::clone(&prepared);
        let applied_seq_clone = Arc::clone(&applied_seq);
        let first = pipeline
            .allocate_seq_num(
                5,
                move || *prepared_clone.lock().unwrap() = true,
                move |seq| *applied_seq_clone.lock().unwrap() = seq,
            )
            .unwrap();

        assert_eq!(first, 1);
        assert!(*prepared.lock().unwrap());
        assert_eq!(*applied_seq.lock().unwrap(), 1);
        assert_eq!(pipeline.log_seq_num(), 5);
        assert_eq!(pipeline.visible_seq_num(), 5);
    }

    #[test]
    fn allocate_seq_num_zero_count_is_coerced_to_one() {
        let pipeline = CommitPipeline::new(CountingEnvironment::new());
        let first = pipeline.allocate_seq_num(0, || {}, |_| {}).unwrap();
        assert_eq!(first, 1);
        assert_eq!(pipeline.log_seq_num(), 1);
    }
}
