//! Staged storage bound to a single actor.
//!
//! [`ActorStorage`] is the interface actor code sees during execution: it
//! buffers writes in the actor's stage, resolves reads through the stage
//! before the durable store, and guards head movement with compare-and-swap
//! plus a completeness check of the proposed graph.

use tracing::debug;

use loam_store::{Chunk, ChunkStore};
use loam_types::{ActorAddress, ActorIdx, ActorTable, ChunkId};

use crate::error::{FaultError, StageError, StageResult};
use crate::reach::live_staged_ids;
use crate::session::{StageEntry, StorageSession};

const STAGE_BOUND: &str = "handle address registered in session";

/// Staged storage handle for one actor within a [`StorageSession`].
///
/// The handle borrows the session mutably, so only one actor's storage can
/// be live per session at a time; the single-writer rule is enforced by the
/// borrow checker instead of by convention.
pub struct ActorStorage<'s> {
    session: &'s mut StorageSession,
    addr: ActorAddress,
}

impl<'s> ActorStorage<'s> {
    pub(crate) fn new(session: &'s mut StorageSession, addr: ActorAddress) -> Self {
        Self { session, addr }
    }

    /// The actor address this storage belongs to.
    pub fn address(&self) -> ActorAddress {
        self.addr
    }

    /// Slot of the actor record currently bound to this storage.
    pub fn actor_index(&self) -> ActorIdx {
        self.entry().actor
    }

    /// Number of staged chunks.
    pub fn staged_len(&self) -> usize {
        self.entry().chunks.len()
    }

    /// Whether `id` is currently staged. Durable chunks do not count.
    pub fn is_staged(&self, id: &ChunkId) -> bool {
        self.entry().chunks.contains_key(id)
    }

    /// The bound actor's current head.
    pub fn head(&self) -> Option<ChunkId> {
        self.session.actors.get(self.entry().actor).head
    }

    /// Decode `bytes` as a chunk and stage it under its content address.
    ///
    /// The durable store is untouched; nothing leaves the stage until
    /// [`ActorStorage::flush`]. Staging identical content twice returns the
    /// same id and keeps a single entry.
    pub fn put(&mut self, bytes: &[u8]) -> StageResult<ChunkId> {
        let chunk = Chunk::decode(bytes).map_err(|e| StageError::Decode(e.to_string()))?;
        let id = chunk.id();
        self.entry_mut().chunks.insert(id, chunk);
        debug!(actor = %self.addr, chunk = %id.short_hex(), "staged chunk");
        Ok(id)
    }

    /// Read a chunk's bytes, staged content first, then the durable store.
    ///
    /// Uncommitted writes are visible to their own actor. Returns
    /// [`StageError::NotFound`] when the id resolves nowhere; store failures
    /// propagate unchanged.
    pub fn get(&self, id: &ChunkId) -> StageResult<Vec<u8>> {
        if let Some(chunk) = self.entry().chunks.get(id) {
            return Ok(chunk.raw_bytes().to_vec());
        }
        match self.session.store.get(id)? {
            Some(bytes) => Ok(bytes),
            None => Err(StageError::NotFound(*id)),
        }
    }

    /// Move the bound actor's head from `expected` to `new`.
    ///
    /// Fails with [`StageError::StaleHead`] when the current head is not
    /// `expected`; two `None`s match, which covers an actor's first commit.
    /// Fails with a fault when anything reachable from `new` resolves
    /// neither in the stage nor durably. Either failure leaves the head
    /// untouched. This is the only operation that moves a head.
    pub fn commit(&mut self, new: ChunkId, expected: Option<ChunkId>) -> StageResult<()> {
        let addr = self.addr;
        let session = &mut *self.session;
        let entry = session.stages.get_mut(&addr).expect(STAGE_BOUND);
        let actor = session.actors.get_mut(entry.actor);

        if actor.head != expected {
            return Err(StageError::StaleHead {
                expected,
                actual: actor.head,
            });
        }

        if let Err(fault) = live_staged_ids(&entry.chunks, &*session.store, Some(new)) {
            return Err(match fault {
                FaultError::MissingChunk(missing) => {
                    FaultError::DanglingReference { root: new, missing }.into()
                }
                probe => probe.into(),
            });
        }

        let old = actor.head.replace(new);
        debug!(
            actor = %addr,
            old = ?old.map(|id| id.short_hex()),
            new = %new.short_hex(),
            "committed head"
        );
        Ok(())
    }

    /// Drop every staged chunk the current head cannot reach.
    ///
    /// A live set the same size as the stage means nothing to drop (the set
    /// only ever contains staged ids). The durable store is never touched.
    /// Pruning twice in a row leaves the stage unchanged.
    pub fn prune(&mut self) -> StageResult<()> {
        let addr = self.addr;
        let session = &mut *self.session;
        let entry = session.stages.get_mut(&addr).expect(STAGE_BOUND);
        let head = session.actors.get(entry.actor).head;

        let live = live_staged_ids(&entry.chunks, &*session.store, head)?;
        if live.len() == entry.chunks.len() {
            return Ok(());
        }

        let before = entry.chunks.len();
        entry.chunks.retain(|id, _| live.contains(id));
        debug!(
            actor = %addr,
            removed = before - entry.chunks.len(),
            "pruned unreachable staged chunks"
        );
        Ok(())
    }

    /// Persist the staged chunks reachable from the current head.
    ///
    /// Already-durable chunks root persisted subgraphs and are not
    /// rewritten. Everything goes out in a single batched store write. The
    /// stage itself is left intact; prune separately to shed it. Store
    /// failures propagate unchanged.
    pub fn flush(&self) -> StageResult<()> {
        let written = flush_stage(self.entry(), &self.session.actors, &*self.session.store)?;
        debug!(actor = %self.addr, chunks = written, "flushed staged storage");
        Ok(())
    }

    fn entry(&self) -> &StageEntry {
        self.session.stages.get(&self.addr).expect(STAGE_BOUND)
    }

    fn entry_mut(&mut self) -> &mut StageEntry {
        self.session.stages.get_mut(&self.addr).expect(STAGE_BOUND)
    }
}

impl std::fmt::Debug for ActorStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorStorage")
            .field("actor", &self.addr)
            .field("staged", &self.staged_len())
            .finish()
    }
}

/// Flush one stage: live set from the bound record's head, then exactly one
/// batched store write. Returns the number of chunks written.
pub(crate) fn flush_stage(
    entry: &StageEntry,
    actors: &ActorTable,
    store: &dyn ChunkStore,
) -> StageResult<usize> {
    let head = actors.get(entry.actor).head;
    let live = live_staged_ids(&entry.chunks, store, head)?;

    let mut batch = Vec::with_capacity(live.len());
    for id in live {
        // Live ids are staged by construction.
        let chunk = &entry.chunks[&id];
        batch.push((id, chunk.raw_bytes().to_vec()));
    }
    store.put_batch(&batch)?;
    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use loam_store::{ChunkData, InMemoryChunkStore, StoreError, StoreResult};
    use loam_types::ActorRecord;

    use super::*;

    fn addr(byte: u8) -> ActorAddress {
        ActorAddress::from_raw([byte; 32])
    }

    fn oid(byte: u8) -> ChunkId {
        ChunkId::from_hash([byte; 32])
    }

    fn chunk_bytes(payload: &[u8], links: Vec<ChunkId>) -> Vec<u8> {
        ChunkData::new(payload.to_vec(), links).to_bytes().unwrap()
    }

    fn session() -> (Arc<InMemoryChunkStore>, StorageSession) {
        let store = Arc::new(InMemoryChunkStore::new());
        let session = StorageSession::new(store.clone());
        (store, session)
    }

    /// Store double that records every batch it is asked to write.
    struct RecordingStore {
        inner: InMemoryChunkStore,
        batches: Mutex<Vec<Vec<ChunkId>>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryChunkStore::new(),
                batches: Mutex::new(Vec::new()),
            }
        }

        fn batches(&self) -> Vec<Vec<ChunkId>> {
            self.batches.lock().expect("lock poisoned").clone()
        }
    }

    impl ChunkStore for RecordingStore {
        fn get(&self, id: &ChunkId) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(id)
        }

        fn has(&self, id: &ChunkId) -> StoreResult<bool> {
            self.inner.has(id)
        }

        fn put_batch(&self, chunks: &[(ChunkId, Vec<u8>)]) -> StoreResult<()> {
            self.batches
                .lock()
                .expect("lock poisoned")
                .push(chunks.iter().map(|(id, _)| *id).collect());
            self.inner.put_batch(chunks)
        }
    }

    /// Store double that fails selected operations.
    struct FailingStore {
        fail_get: bool,
        fail_has: bool,
        fail_put: bool,
    }

    impl FailingStore {
        fn none() -> Self {
            Self {
                fail_get: false,
                fail_has: false,
                fail_put: false,
            }
        }
    }

    impl ChunkStore for FailingStore {
        fn get(&self, _id: &ChunkId) -> StoreResult<Option<Vec<u8>>> {
            if self.fail_get {
                return Err(StoreError::Backend("get failed".into()));
            }
            Ok(None)
        }

        fn has(&self, _id: &ChunkId) -> StoreResult<bool> {
            if self.fail_has {
                return Err(StoreError::Backend("has failed".into()));
            }
            Ok(false)
        }

        fn put_batch(&self, _chunks: &[(ChunkId, Vec<u8>)]) -> StoreResult<()> {
            if self.fail_put {
                return Err(StoreError::Backend("put_batch failed".into()));
            }
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // put
    // -----------------------------------------------------------------------

    #[test]
    fn put_returns_the_content_address() {
        let (store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let bytes = chunk_bytes(b"state", vec![]);
        let id1 = storage.put(&bytes).unwrap();
        let id2 = storage.put(&bytes).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(storage.staged_len(), 1);
        assert!(storage.is_staged(&id1));
        // Nothing escapes the stage on put.
        assert!(store.is_empty());
    }

    #[test]
    fn put_is_deterministic_across_sessions() {
        let (_s1, mut one) = session();
        let (_s2, mut two) = session();
        let bytes = chunk_bytes(b"same content", vec![oid(3)]);

        let id_one = one.get_or_create(addr(1), ActorRecord::new()).put(&bytes).unwrap();
        let id_two = two.get_or_create(addr(2), ActorRecord::new()).put(&bytes).unwrap();
        assert_eq!(id_one, id_two);
    }

    #[test]
    fn put_rejects_undecodable_bytes() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let err = storage.put(&[0xFF; 8]).unwrap_err();
        assert!(matches!(err, StageError::Decode(_)));
        assert_eq!(storage.staged_len(), 0);
    }

    // -----------------------------------------------------------------------
    // get
    // -----------------------------------------------------------------------

    #[test]
    fn get_sees_uncommitted_staged_content() {
        let (store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let bytes = chunk_bytes(b"uncommitted", vec![]);
        let id = storage.put(&bytes).unwrap();

        // The durable store has never seen this chunk.
        assert!(!store.contains(&id));
        assert_eq!(storage.get(&id).unwrap(), bytes);
    }

    #[test]
    fn get_falls_back_to_the_durable_store() {
        let (store, mut session) = session();

        let bytes = chunk_bytes(b"persisted earlier", vec![]);
        let id = Chunk::decode(&bytes).unwrap().id();
        store.put(id, bytes.clone()).unwrap();

        let storage = session.get_or_create(addr(1), ActorRecord::new());
        assert!(!storage.is_staged(&id));
        assert_eq!(storage.get(&id).unwrap(), bytes);
    }

    #[test]
    fn get_missing_chunk_is_not_found() {
        let (_store, mut session) = session();
        let storage = session.get_or_create(addr(1), ActorRecord::new());

        let err = storage.get(&oid(9)).unwrap_err();
        assert!(matches!(err, StageError::NotFound(id) if id == oid(9)));
    }

    #[test]
    fn get_propagates_store_failures_unchanged() {
        let mut session = StorageSession::new(Arc::new(FailingStore {
            fail_get: true,
            ..FailingStore::none()
        }));
        let storage = session.get_or_create(addr(1), ActorRecord::new());

        let err = storage.get(&oid(1)).unwrap_err();
        assert!(matches!(err, StageError::Store(StoreError::Backend(_))));
    }

    // -----------------------------------------------------------------------
    // head / commit
    // -----------------------------------------------------------------------

    #[test]
    fn head_reflects_the_bound_record() {
        let (_store, mut session) = session();
        let existing = oid(4);

        let storage = session.get_or_create(addr(1), ActorRecord::with_head(existing));
        assert_eq!(storage.head(), Some(existing));
    }

    #[test]
    fn first_commit_matches_on_both_none() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let id = storage.put(&chunk_bytes(b"genesis state", vec![])).unwrap();
        storage.commit(id, None).unwrap();
        assert_eq!(storage.head(), Some(id));
    }

    #[test]
    fn commit_chains_through_expected_heads() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let first = storage.put(&chunk_bytes(b"v1", vec![])).unwrap();
        storage.commit(first, None).unwrap();

        let second = storage.put(&chunk_bytes(b"v2", vec![first])).unwrap();
        storage.commit(second, Some(first)).unwrap();
        assert_eq!(storage.head(), Some(second));
    }

    #[test]
    fn stale_expected_head_is_rejected_without_mutation() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let committed = storage.put(&chunk_bytes(b"committed", vec![])).unwrap();
        storage.commit(committed, None).unwrap();

        let next = storage.put(&chunk_bytes(b"next", vec![])).unwrap();

        // A racing writer's view: expected None no longer holds.
        let err = storage.commit(next, None).unwrap_err();
        assert!(matches!(
            err,
            StageError::StaleHead { expected: None, actual: Some(actual) } if actual == committed
        ));

        // Wrong non-nil expectation is rejected the same way.
        let err = storage.commit(next, Some(next)).unwrap_err();
        assert!(matches!(err, StageError::StaleHead { .. }));

        assert_eq!(storage.head(), Some(committed));
    }

    #[test]
    fn commit_to_unresolvable_root_faults_and_leaves_head_unset() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let err = storage.commit(oid(7), None).unwrap_err();
        assert!(matches!(
            err,
            StageError::Fault(FaultError::DanglingReference { root, missing })
                if root == oid(7) && missing == oid(7)
        ));
        assert_eq!(storage.head(), None);
    }

    #[test]
    fn commit_with_missing_transitive_link_faults() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let parent = storage
            .put(&chunk_bytes(b"parent", vec![oid(42)]))
            .unwrap();

        let err = storage.commit(parent, None).unwrap_err();
        assert!(matches!(
            err,
            StageError::Fault(FaultError::DanglingReference { root, missing })
                if root == parent && missing == oid(42)
        ));
        assert_eq!(storage.head(), None);
    }

    #[test]
    fn commit_accepts_links_to_durable_chunks() {
        let (store, mut session) = session();

        let child_bytes = chunk_bytes(b"old child", vec![]);
        let child = Chunk::decode(&child_bytes).unwrap().id();
        store.put(child, child_bytes).unwrap();

        let mut storage = session.get_or_create(addr(1), ActorRecord::new());
        let parent = storage.put(&chunk_bytes(b"parent", vec![child])).unwrap();
        storage.commit(parent, None).unwrap();
        assert_eq!(storage.head(), Some(parent));
    }

    #[test]
    fn commit_probe_failure_surfaces_as_exists_check() {
        let mut session = StorageSession::new(Arc::new(FailingStore {
            fail_has: true,
            ..FailingStore::none()
        }));
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let parent = storage
            .put(&chunk_bytes(b"parent", vec![oid(13)]))
            .unwrap();

        let err = storage.commit(parent, None).unwrap_err();
        assert!(matches!(
            err,
            StageError::Fault(FaultError::ExistsCheck { id, .. }) if id == oid(13)
        ));
        assert_eq!(storage.head(), None);
    }

    // -----------------------------------------------------------------------
    // prune
    // -----------------------------------------------------------------------

    #[test]
    fn prune_drops_unreachable_chunks_and_is_idempotent() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let kept = storage.put(&chunk_bytes(b"kept", vec![])).unwrap();
        let orphan = storage.put(&chunk_bytes(b"orphan", vec![])).unwrap();
        storage.commit(kept, None).unwrap();

        storage.prune().unwrap();
        assert_eq!(storage.staged_len(), 1);
        assert!(storage.is_staged(&kept));
        assert!(!storage.is_staged(&orphan));

        storage.prune().unwrap();
        assert_eq!(storage.staged_len(), 1);
        assert!(storage.is_staged(&kept));
    }

    #[test]
    fn prune_without_a_head_clears_the_stage() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        storage.put(&chunk_bytes(b"never committed", vec![])).unwrap();
        storage.prune().unwrap();
        assert_eq!(storage.staged_len(), 0);
    }

    #[test]
    fn prune_keeps_whole_live_graphs() {
        let (_store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let leaf = storage.put(&chunk_bytes(b"leaf", vec![])).unwrap();
        let root = storage.put(&chunk_bytes(b"root", vec![leaf])).unwrap();
        storage.commit(root, None).unwrap();

        storage.prune().unwrap();
        assert_eq!(storage.staged_len(), 2);
        assert!(storage.is_staged(&leaf));
        assert!(storage.is_staged(&root));
    }

    #[test]
    fn prune_propagates_traversal_faults() {
        let (_store, mut session) = session();
        let bogus = oid(66);
        let mut storage = session.get_or_create(addr(1), ActorRecord::with_head(bogus));

        let err = storage.prune().unwrap_err();
        assert!(matches!(
            err,
            StageError::Fault(FaultError::MissingChunk(id)) if id == bogus
        ));
    }

    // -----------------------------------------------------------------------
    // flush
    // -----------------------------------------------------------------------

    #[test]
    fn linkless_chunk_flushes_alone() {
        let (store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let id = storage.put(&chunk_bytes(b"single", vec![])).unwrap();
        storage.commit(id, None).unwrap();
        storage.flush().unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains(&id));
    }

    #[test]
    fn flush_persists_the_live_graph_and_skips_orphans() {
        let (store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        let leaf = storage.put(&chunk_bytes(b"leaf", vec![])).unwrap();
        let root = storage.put(&chunk_bytes(b"root", vec![leaf])).unwrap();
        let orphan = storage.put(&chunk_bytes(b"orphan", vec![])).unwrap();
        storage.commit(root, None).unwrap();

        storage.flush().unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains(&root));
        assert!(store.contains(&leaf));
        assert!(!store.contains(&orphan));

        // The stage is untouched by flush.
        assert_eq!(storage.staged_len(), 3);
    }

    #[test]
    fn flush_writes_one_batch_and_skips_durable_subgraphs() {
        let recording = Arc::new(RecordingStore::new());

        let child_bytes = chunk_bytes(b"already durable", vec![]);
        let child = Chunk::decode(&child_bytes).unwrap().id();
        recording.inner.put(child, child_bytes).unwrap();

        let mut session = StorageSession::new(recording.clone());
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());
        let parent = storage.put(&chunk_bytes(b"parent", vec![child])).unwrap();
        storage.commit(parent, None).unwrap();
        storage.flush().unwrap();

        // The session issued exactly one batch, and it re-collects nothing
        // already durable.
        assert_eq!(recording.batches(), vec![vec![parent]]);
    }

    #[test]
    fn flush_without_a_head_writes_nothing() {
        let (store, mut session) = session();
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        storage.put(&chunk_bytes(b"staged only", vec![])).unwrap();
        storage.flush().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn flush_propagates_store_write_failures() {
        let mut session = StorageSession::new(Arc::new(FailingStore {
            fail_put: true,
            ..FailingStore::none()
        }));
        let mut storage = session.get_or_create(addr(1), ActorRecord::new());

        // A fully staged graph never probes the store, so commit succeeds.
        let id = storage.put(&chunk_bytes(b"state", vec![])).unwrap();
        storage.commit(id, None).unwrap();

        let err = storage.flush().unwrap_err();
        assert!(matches!(err, StageError::Store(StoreError::Backend(_))));
    }

    // -----------------------------------------------------------------------
    // misc
    // -----------------------------------------------------------------------

    #[test]
    fn address_and_debug() {
        let (_store, mut session) = session();
        let storage = session.get_or_create(addr(3), ActorRecord::new());

        assert_eq!(storage.address(), addr(3));
        let debug = format!("{storage:?}");
        assert!(debug.contains("ActorStorage"));
    }
}
