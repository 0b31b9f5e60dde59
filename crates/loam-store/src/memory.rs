use std::collections::HashMap;
use std::sync::RwLock;

use loam_types::ChunkId;

use crate::error::StoreResult;
use crate::traits::ChunkStore;

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. All chunks are held in memory behind a
/// `RwLock` for safe concurrent access. Bytes are cloned on read.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkId, Vec<u8>>>,
}

impl InMemoryChunkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    /// Whether `id` is present, without the trait's `Result` wrapping.
    pub fn contains(&self, id: &ChunkId) -> bool {
        self.chunks.read().expect("lock poisoned").contains_key(id)
    }

    /// Total bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|bytes| bytes.len() as u64)
            .sum()
    }

    /// Remove all chunks from the store.
    pub fn clear(&self) {
        self.chunks.write().expect("lock poisoned").clear();
    }

    /// Return a sorted list of all chunk ids in the store.
    pub fn all_ids(&self) -> Vec<ChunkId> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut ids: Vec<ChunkId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn get(&self, id: &ChunkId) -> StoreResult<Option<Vec<u8>>> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn has(&self, id: &ChunkId) -> StoreResult<bool> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn put_batch(&self, chunks: &[(ChunkId, Vec<u8>)]) -> StoreResult<()> {
        let mut map = self.chunks.write().expect("lock poisoned");
        for (id, bytes) in chunks {
            // Idempotent: under content-addressing an existing id already
            // holds these bytes.
            map.entry(*id).or_insert_with(|| bytes.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &count)
            .finish()
    }
}
