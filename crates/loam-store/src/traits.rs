use loam_types::ChunkId;

use crate::error::StoreResult;

/// Durable chunk store beneath the staging layer.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written. A given id always maps to the same
///   bytes (content-addressing guarantees this).
/// - `put_batch` is atomic or better per call: after it returns `Ok`, every
///   chunk in the batch is readable; no partially visible batch.
/// - Not-found is data, not failure: `get` returns `Ok(None)` for a missing
///   chunk and reserves `Err` for real store faults.
/// - The store never interprets chunk contents -- it is a pure key-value store.
/// - All I/O errors are propagated, never silently ignored.
pub trait ChunkStore: Send + Sync {
    /// Read a chunk's bytes by id.
    ///
    /// Returns `Ok(None)` if the chunk does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn get(&self, id: &ChunkId) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether a chunk exists without reading its bytes.
    fn has(&self, id: &ChunkId) -> StoreResult<bool>;

    /// Write a batch of chunks. Rewriting an existing id is a no-op
    /// (idempotent).
    fn put_batch(&self, chunks: &[(ChunkId, Vec<u8>)]) -> StoreResult<()>;

    /// Write a single chunk.
    ///
    /// Default implementation is a one-element [`ChunkStore::put_batch`].
    fn put(&self, id: ChunkId, bytes: Vec<u8>) -> StoreResult<()> {
        self.put_batch(&[(id, bytes)])
    }
}
