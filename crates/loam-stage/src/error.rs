//! Error types for staged storage.

use loam_store::StoreError;
use loam_types::ChunkId;

/// Fatal storage faults.
///
/// A fault means the layer cannot uphold its own invariants: a graph that is
/// committed (or about to be) references data that resolves neither in the
/// stage nor in the durable store, or the store failed while being probed.
/// Callers abort the enclosing state transition rather than handle these.
#[derive(Debug, thiserror::Error)]
pub enum FaultError {
    /// Commit validation found a link that resolves nowhere.
    #[error("dangling reference under new head {root:?}: chunk {missing:?} is neither staged nor durable")]
    DanglingReference {
        /// The head the commit proposed.
        root: ChunkId,
        /// The reachable chunk that resolves nowhere.
        missing: ChunkId,
    },

    /// Traversal of an already-committed graph found a link that resolves
    /// nowhere.
    #[error("linked chunk {0:?} is neither staged nor durable")]
    MissingChunk(ChunkId),

    /// The durable store failed while checking existence of a linked chunk.
    #[error("existence check failed for linked chunk {id:?}")]
    ExistsCheck {
        /// The chunk being probed.
        id: ChunkId,
        #[source]
        source: StoreError,
    },
}

/// Errors from staged storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The chunk is neither staged nor in the durable store.
    #[error("chunk not found: {0:?}")]
    NotFound(ChunkId),

    /// The supplied bytes are not a valid chunk encoding.
    #[error("chunk decode failed: {0}")]
    Decode(String),

    /// The expected head did not match the actor's current head. Nothing
    /// was mutated; the caller decides whether to re-read and retry.
    #[error("stale head: expected {expected:?}, actual {actual:?}")]
    StaleHead {
        expected: Option<ChunkId>,
        actual: Option<ChunkId>,
    },

    /// Fatal fault: dangling reference or failed existence probe.
    #[error(transparent)]
    Fault(#[from] FaultError),

    /// Durable store failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for staged storage operations.
pub type StageResult<T> = Result<T, StageError>;
