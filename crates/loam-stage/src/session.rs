//! The per-execution storage session: actor registry plus shared store.
//!
//! One [`StorageSession`] lives for one execution context (typically a
//! block). The executor owns it and passes it by reference into actor
//! invocations; nothing here is process-global.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use loam_store::{Chunk, ChunkStore};
use loam_types::{ActorAddress, ActorIdx, ActorRecord, ActorTable, ChunkId};

use crate::error::StageResult;
use crate::storage::{flush_stage, ActorStorage};

/// One actor's stage plus the actor slot it is bound to.
pub(crate) struct StageEntry {
    /// Slot of the most recently bound record.
    pub(crate) actor: ActorIdx,
    /// Staged chunks keyed by content address.
    pub(crate) chunks: HashMap<ChunkId, Chunk>,
}

/// Storage registry for one execution context.
///
/// Tracks every staged storage created during the context, owns the actor
/// records handed in by the executor, and shares one durable store handle
/// across all stages. Addresses are kept ordered so [`flush_all`] walks
/// actors deterministically.
///
/// [`flush_all`]: StorageSession::flush_all
pub struct StorageSession {
    pub(crate) store: Arc<dyn ChunkStore>,
    pub(crate) actors: ActorTable,
    pub(crate) stages: BTreeMap<ActorAddress, StageEntry>,
}

impl StorageSession {
    /// Create a session over the given durable store.
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            actors: ActorTable::new(),
            stages: BTreeMap::new(),
        }
    }

    /// Bind `record` to the staged storage for `addr`, creating the stage
    /// the first time the context touches the actor.
    ///
    /// Every call inserts `record` into the session's actor table and the
    /// returned handle operates on that fresh slot. If the address already
    /// has a stage, its chunks survive and only the binding moves: the new
    /// record is the authoritative one, and commits through the returned
    /// handle mutate it, never an earlier slot.
    pub fn get_or_create(&mut self, addr: ActorAddress, record: ActorRecord) -> ActorStorage<'_> {
        let idx = self.actors.insert(record);
        match self.stages.get_mut(&addr) {
            Some(entry) => {
                entry.actor = idx;
                debug!(actor = %addr, "rebound staged storage to new actor record");
            }
            None => {
                self.stages.insert(
                    addr,
                    StageEntry {
                        actor: idx,
                        chunks: HashMap::new(),
                    },
                );
                debug!(actor = %addr, "created staged storage");
            }
        }
        ActorStorage::new(self, addr)
    }

    /// Flush every staged storage, in address order.
    ///
    /// Stops at the first failure and returns it. Stages flushed before the
    /// failure stay persisted; there is no cross-actor rollback.
    pub fn flush_all(&self) -> StageResult<()> {
        for (addr, entry) in &self.stages {
            let written = flush_stage(entry, &self.actors, &*self.store)?;
            debug!(actor = %addr, chunks = written, "flushed staged storage");
        }
        Ok(())
    }

    /// Read an actor record by its slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx` came from a different session.
    pub fn actor(&self, idx: ActorIdx) -> &ActorRecord {
        self.actors.get(idx)
    }

    /// Mutate an actor record by its slot. The storage layer itself only
    /// moves `head`; this is the executor's access to the rest.
    ///
    /// # Panics
    ///
    /// Panics if `idx` came from a different session.
    pub fn actor_mut(&mut self, idx: ActorIdx) -> &mut ActorRecord {
        self.actors.get_mut(idx)
    }

    /// Number of staged storages created in this session.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if no staged storage has been created yet.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSession")
            .field("actors", &self.actors.len())
            .field("stages", &self.stages.len())
            .finish()
    }
}
