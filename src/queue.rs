use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::batch::Batch;

/// FIFO of in-flight batches, ordered by enqueue time.
///
/// A batch is dequeued only after its `applied` bit is observed set and all
/// strictly earlier batches have already been dequeued. Enqueues are already
/// serialized by the pipeline's prepare lock and dequeues by its publish
/// lock, so this is a plain `Mutex`-guarded deque rather than an intrusive
/// lock-free list: the design notes explicitly call that an equally-correct
/// simplification over a CAS-based FIFO, since there is never more than one
/// writer or more than one reader active at a time.
pub(crate) struct CommitQueue {
    inner: Mutex<VecDeque<Arc<Batch>>>,
}

impl CommitQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends `batch` to the tail. Callers are expected to already be
    /// serialized (under the prepare lock).
    pub(crate) fn enqueue(&self, batch: Arc<Batch>) {
        self.inner.lock().unwrap().push_back(batch);
    }

    /// If the head of the queue is applied, unlinks and returns it.
    /// Otherwise returns `None` without mutating the queue. Only one
    /// dequeuer is expected to run at a time (under the publish lock).
    pub(crate) fn dequeue(&self) -> Option<Arc<Batch>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.front() {
            Some(head) if head.is_applied() => inner.pop_front(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mirrors the "queue ordering under selective applied flags" scenario:
    // dequeue must never skip an unapplied head, and must drain in
    // enqueue order once batches are marked applied in order.
    #[test]
    fn dequeue_never_skips_unapplied_head() {
        let queue = CommitQueue::new();
        let batches: Vec<Arc<Batch>> = (0..16).map(|_| Arc::new(Batch::new(1, b"x"))).collect();
        for b in &batches {
            queue.enqueue(Arc::clone(b));
        }

        assert!(queue.dequeue().is_none());

        // Marking an interior batch applied must not let dequeue skip ahead.
        batches[1].mark_applied();
        assert!(queue.dequeue().is_none());

        for (i, b) in batches.iter().enumerate() {
            b.mark_applied();
            let dequeued = queue.dequeue().expect("expected a batch");
            assert!(Arc::ptr_eq(&dequeued, b), "dequeue returned out of order at {i}");
        }

        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn enqueue_then_immediate_apply_dequeues_single_batch() {
        let queue = CommitQueue::new();
        let batch = Arc::new(Batch::new(1, b"x"));
        queue.enqueue(Arc::clone(&batch));
        batch.mark_applied();
        let dequeued = queue.dequeue().unwrap();
        assert!(Arc::ptr_eq(&dequeued, &batch));
        assert!(queue.dequeue().is_none());
    }
}
