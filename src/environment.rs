use std::sync::Arc;

use crate::batch::Batch;
use crate::error::BoxedError;

/// Injected contract the commit pipeline consumes from the host engine.
///
/// Not an implementation: the host engine owns memtable selection and
/// rotation, and the WAL file itself. The pipeline only calls `write` and
/// `apply` in that order for each batch and never inspects `Memtable`
/// beyond passing it from one call to the other.
///
/// `write` and `apply` are invoked on the submitting thread; this trait does
/// not assume or require any background worker.
pub trait CommitEnvironment: Send + Sync {
    /// Opaque handle to the memtable a batch should be applied into. The
    /// pipeline is oblivious to how it was chosen (including any rotation
    /// performed when an arena-full condition is hit inside `write`).
    type Memtable: Send + Sync;

    /// Durably appends `batch`'s payload to the WAL.
    ///
    /// If `sync` is `true`, the implementation must arrange for
    /// `batch`'s sync waiter to eventually be signalled (via the crate's
    /// internal `Batch::signal_sync`, reachable through whatever durability
    /// mechanism the implementation uses) once the fsync covering this
    /// batch's record has completed, possibly batched together with other
    /// in-flight syncs. If `sync` is `false`, no such signal is required.
    ///
    /// Returns the memtable this batch must be applied into.
    fn write(
        &self,
        batch: &Arc<Batch>,
        sync: bool,
    ) -> Result<Arc<Self::Memtable>, BoxedError>;

    /// Installs `batch`'s operations into `memtable`.
    fn apply(&self, batch: &Arc<Batch>, memtable: &Self::Memtable) -> Result<(), BoxedError>;
}
