use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::BoxedError;

/// Offset of the 8-byte sequence-number slot in a batch's wire payload.
const SEQ_SLOT: usize = 0;
/// Offset of the 4-byte operation-count slot in a batch's wire payload.
const COUNT_SLOT: usize = 8;
/// Size of the fixed prefix (sequence slot + count slot) every payload carries.
pub const PAYLOAD_HEADER_LEN: usize = 12;

/// Outcome of an asynchronous WAL fsync, delivered to a batch's submitter
/// once the group-commit sync covering its record has completed.
#[derive(Debug, Default)]
struct SyncState {
    done: bool,
    error: Option<BoxedError>,
}

/// A caller-owned unit of work submitted to the commit pipeline.
///
/// A batch may be committed at most once; reusing a `Batch` after `Commit`
/// returns is permitted but is the caller's responsibility (the sequence
/// number and applied flag are not reset automatically).
pub struct Batch {
    payload: Mutex<Vec<u8>>,
    seq_num: AtomicU64,
    applied: AtomicBool,
    sync: (Mutex<SyncState>, Condvar),
}

impl Batch {
    /// Builds a batch from already-encoded operation bytes and their count.
    ///
    /// The payload is assembled with a zeroed sequence-number slot; the
    /// pipeline's prepare stage stamps the real value in once one is
    /// assigned.
    pub fn new(count: u32, ops: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(PAYLOAD_HEADER_LEN + ops.len());
        payload.extend_from_slice(&0u64.to_le_bytes());
        payload.extend_from_slice(&count.to_le_bytes());
        payload.extend_from_slice(ops);
        Self::from_payload(payload)
    }

    /// Builds a sentinel batch carrying `count` logical operations but no
    /// operation bytes, as used by `AllocateSeqNum`.
    pub fn sentinel(count: u32) -> Self {
        Self::new(count, &[])
    }

    fn from_payload(payload: Vec<u8>) -> Self {
        Self {
            payload: Mutex::new(payload),
            seq_num: AtomicU64::new(0),
            applied: AtomicBool::new(false),
            sync: (Mutex::new(SyncState::default()), Condvar::new()),
        }
    }

    /// Number of logical operations in this batch, read from the payload's
    /// count slot.
    pub fn count(&self) -> u64 {
        let payload = self.payload.lock().unwrap();
        u32::from_le_bytes(payload[COUNT_SLOT..COUNT_SLOT + 4].try_into().unwrap()) as u64
    }

    /// The sequence number stamped into this batch, or zero if unstamped.
    pub fn seq_num(&self) -> u64 {
        self.seq_num.load(Ordering::Acquire)
    }

    /// Stamps `seq` as this batch's starting sequence number, both in the
    /// atomic cursor readers use and in the payload's wire prefix.
    pub(crate) fn set_seq_num(&self, seq: u64) {
        self.seq_num.store(seq, Ordering::Release);
        let mut payload = self.payload.lock().unwrap();
        payload[SEQ_SLOT..SEQ_SLOT + 8].copy_from_slice(&seq.to_le_bytes());
    }

    /// Runs `f` over the current payload bytes (sequence-stamped, if the
    /// prepare stage has already run).
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let payload = self.payload.lock().unwrap();
        f(&payload)
    }

    /// Whether `apply` has returned successfully (or, for an errored batch,
    /// whether the pipeline has finished processing it so the commit queue
    /// can advance past it).
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    /// Marks this batch applied. Pairs with `is_applied`'s acquire load so
    /// the dequeuer observes the apply stage's side effects before
    /// publishing.
    pub(crate) fn mark_applied(&self) {
        self.applied.store(true, Ordering::Release);
    }

    /// Signals that the WAL fsync covering this batch (if any) has
    /// completed, waking any submitter blocked in `wait_for_sync`.
    pub(crate) fn signal_sync(&self, result: std::result::Result<(), BoxedError>) {
        let (lock, cvar) = &self.sync;
        let mut state = lock.lock().unwrap();
        state.done = true;
        state.error = result.err();
        cvar.notify_all();
    }

    /// Blocks the calling thread until `signal_sync` has been called for
    /// this batch, then returns the recorded fsync outcome.
    pub(crate) fn wait_for_sync(&self) -> std::result::Result<(), BoxedError> {
        let (lock, cvar) = &self.sync;
        let mut state = lock.lock().unwrap();
        while !state.done {
            state = cvar.wait(state).unwrap();
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_reads_back_from_payload() {
        let batch = Batch::new(3, b"abc");
        assert_eq!(batch.count(), 3);
    }

    #[test]
    fn seq_num_starts_unstamped() {
        let batch = Batch::new(1, b"x");
        assert_eq!(batch.seq_num(), 0);
        batch.set_seq_num(42);
        assert_eq!(batch.seq_num(), 42);
        batch.with_payload(|p| {
            assert_eq!(&p[0..8], &42u64.to_le_bytes());
        });
    }

    #[test]
    fn applied_flag_round_trips() {
        let batch = Batch::new(1, b"x");
        assert!(!batch.is_applied());
        batch.mark_applied();
        assert!(batch.is_applied());
    }

    #[test]
    fn sync_wait_blocks_until_signalled() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let batch = Arc::new(Batch::new(1, b"x"));
        let signaller = Arc::clone(&batch);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal_sync(Ok(()));
        });

        let start = std::time::Instant::now();
        batch.wait_for_sync().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(15));
        handle.join().unwrap();
    }
}
