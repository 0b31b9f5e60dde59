use serde::{Deserialize, Serialize};

use crate::chunk_id::ChunkId;

/// An actor entity as the executor sees it.
///
/// The storage layer treats everything here as opaque except `head`, the root
/// of the actor's committed state graph. `head` is `None` until the actor's
/// first successful commit, and only a successful commit may change it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    /// Root of the committed state graph.
    pub head: Option<ChunkId>,
    /// Code chunk the actor executes.
    pub code: Option<ChunkId>,
    /// Call sequence number, maintained by the executor.
    pub nonce: u64,
    /// Token balance, maintained by the executor.
    pub balance: u128,
}

impl ActorRecord {
    /// An empty record: no head, no code, zero nonce and balance.
    pub fn new() -> Self {
        Self::default()
    }

    /// A record whose state graph is already rooted at `head`.
    pub fn with_head(head: ChunkId) -> Self {
        Self {
            head: Some(head),
            ..Self::default()
        }
    }
}

/// Handle to an [`ActorRecord`] inside an [`ActorTable`].
///
/// Indices are minted only by [`ActorTable::insert`] and stay valid for the
/// lifetime of the table (records are never removed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorIdx(usize);

/// Arena of actor records for one execution session.
///
/// Records are addressed through [`ActorIdx`] handles instead of borrowed
/// pointers, so every head update flows through the table and is visible at
/// its single call site rather than through an alias held elsewhere.
#[derive(Debug, Default)]
pub struct ActorTable {
    records: Vec<ActorRecord>,
}

impl ActorTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, returning its handle. Every call gets a fresh slot,
    /// even for records that compare equal.
    pub fn insert(&mut self, record: ActorRecord) -> ActorIdx {
        let idx = ActorIdx(self.records.len());
        self.records.push(record);
        idx
    }

    /// Read a record.
    ///
    /// # Panics
    ///
    /// Panics if `idx` was minted by a different table.
    pub fn get(&self, idx: ActorIdx) -> &ActorRecord {
        &self.records[idx.0]
    }

    /// Mutate a record.
    ///
    /// # Panics
    ///
    /// Panics if `idx` was minted by a different table.
    pub fn get_mut(&mut self, idx: ActorIdx) -> &mut ActorRecord {
        &mut self.records[idx.0]
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records have been inserted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records with their handles, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ActorIdx, &ActorRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (ActorIdx(i), record))
    }
}
