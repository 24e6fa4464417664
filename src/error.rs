use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Errors surfaced by the commit pipeline to a batch's submitter.
///
/// The first error encountered in a batch's `write` or `apply` stage is the
/// result returned to that batch's caller; it never affects other in-flight
/// batches (see the propagation policy in the commit pipeline's design).
#[derive(Debug)]
pub enum PipelineError {
    /// The environment's `write` hook failed (WAL append or fsync).
    Write(Box<dyn StdError + Send + Sync>),
    /// The environment's `apply` hook failed (memtable rejected the batch).
    Apply(Box<dyn StdError + Send + Sync>),
    /// An I/O error surfaced directly by a reference collaborator (e.g. the
    /// reference WAL journal) rather than wrapped through `write`/`apply`.
    Io(io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Write(e) => write!(f, "commit write failed: {e}"),
            PipelineError::Apply(e) => write!(f, "commit apply failed: {e}"),
            PipelineError::Io(e) => write!(f, "commit I/O error: {e}"),
        }
    }
}

impl StdError for PipelineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PipelineError::Write(e) => Some(e.as_ref()),
            PipelineError::Apply(e) => Some(e.as_ref()),
            PipelineError::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Io(err)
    }
}

/// Clonable, `Send + Sync` result alias used for errors that must be stashed
/// in a shared slot (e.g. an async fsync error observed by multiple waiters).
pub type BoxedError = Box<dyn StdError + Send + Sync>;

pub type Result<T> = std::result::Result<T, PipelineError>;
