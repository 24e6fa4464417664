use std::time::Duration;

/// Configuration for the reference WAL journal's group-commit behavior.
///
/// Checkpointing and size-based rotation (present in the teacher's own
/// `WALConfig`) are out of scope here: this crate's WAL is a reference
/// collaborator for exercising the commit pipeline, not a full recovery
/// subsystem, and is truncated only in tests via `WALJournal::truncate`.
#[derive(Debug, Clone)]
pub struct WALConfig {
    /// How long a group-commit leader spins to collect additional
    /// transactions before fsyncing, trading a little latency for more
    /// batching under load. Zero disables the batching window (fsync as
    /// soon as a leader is elected).
    pub group_commit_window: Duration,
}

impl Default for WALConfig {
    fn default() -> Self {
        Self {
            group_commit_window: Duration::ZERO,
        }
    }
}
