use std::sync::{Condvar, Mutex};

/// Admission semaphore of fixed capacity limiting how many batches may be
/// simultaneously in the write+apply stage.
///
/// Bounds concurrency to avoid unbounded memtable pressure and caps the WAL
/// writer's group-sync coalescing window. Built from a `Mutex` + `Condvar`
/// pair in the same style as the reference WAL journal's leader/follower
/// wait, rather than reaching for a dedicated semaphore primitive.
pub(crate) struct CommitSemaphore {
    state: Mutex<usize>,
    cvar: Condvar,
    capacity: usize,
}

impl CommitSemaphore {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "commit_concurrency must be at least 1");
        Self {
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a slot is available, then reserves it. Returns a guard
    /// that releases the slot on drop.
    pub(crate) fn acquire(&self) -> CommitPermit<'_> {
        let mut available = self.state.lock().unwrap();
        while *available == 0 {
            available = self.cvar.wait(available).unwrap();
        }
        *available -= 1;
        CommitPermit { sem: self }
    }

    fn release(&self) {
        let mut available = self.state.lock().unwrap();
        *available += 1;
        self.cvar.notify_one();
    }
}

/// RAII permit returned by `CommitSemaphore::acquire`. Releases its slot
/// back to the semaphore when dropped, regardless of whether the commit
/// that held it succeeded or errored, which is how the pipeline guarantees
/// forward progress for later submitters even on an errored batch.
pub(crate) struct CommitPermit<'a> {
    sem: &'a CommitSemaphore,
}

impl Drop for CommitPermit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn blocks_when_capacity_exhausted() {
        let sem = Arc::new(CommitSemaphore::new(1));
        let _first = sem.acquire();

        let sem2 = Arc::clone(&sem);
        let got_second = Arc::new(AtomicUsize::new(0));
        let got_second_clone = Arc::clone(&got_second);
        let handle = thread::spawn(move || {
            let _second = sem2.acquire();
            got_second_clone.store(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert_eq!(got_second.load(Ordering::SeqCst), 0, "second acquire must block");

        drop(_first);
        handle.join().unwrap();
        assert_eq!(got_second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_wakes_a_single_waiter_at_a_time() {
        let sem = CommitSemaphore::new(2);
        assert_eq!(sem.capacity(), 2);
        let a = sem.acquire();
        let b = sem.acquire();
        drop(a);
        drop(b);
        // Both released; capacity should be fully restored.
        let _c = sem.acquire();
        let _d = sem.acquire();
    }
}
