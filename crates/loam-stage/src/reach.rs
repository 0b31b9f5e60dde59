//! Reachability analysis over staged and durable chunks.
//!
//! One walk serves three callers: commit validates that a proposed head
//! resolves completely, prune keeps exactly the staged chunks the head can
//! reach, and flush collects those same chunks for persistence.

use std::collections::{HashMap, HashSet};

use loam_store::{Chunk, ChunkStore};
use loam_types::ChunkId;

use crate::error::FaultError;

/// Collect the staged chunk ids reachable from `root`.
///
/// The walk is iterative, with an explicit work stack and a visited set, so
/// deep or heavily shared graphs cost heap proportional to their size rather
/// than call stack. Each id resolves one of four ways:
///
/// - staged: recorded in the live set, its links descended
/// - durable only: the walk stops there; an already-persisted chunk is taken
///   to root a complete subgraph, and its id is not recorded (the live set
///   holds staged ids only)
/// - neither: [`FaultError::MissingChunk`]
/// - existence probe fails: [`FaultError::ExistsCheck`]
///
/// A `None` root yields an empty set, so a never-committed actor prunes to
/// an empty stage and flushes nothing.
pub(crate) fn live_staged_ids(
    stage: &HashMap<ChunkId, Chunk>,
    store: &dyn ChunkStore,
    root: Option<ChunkId>,
) -> Result<HashSet<ChunkId>, FaultError> {
    let mut live = HashSet::new();
    let mut visited = HashSet::new();
    let mut work: Vec<ChunkId> = Vec::new();

    if let Some(root) = root {
        work.push(root);
    }

    while let Some(id) = work.pop() {
        if !visited.insert(id) {
            continue;
        }
        match stage.get(&id) {
            Some(chunk) => {
                live.insert(id);
                for link in chunk.links() {
                    if !visited.contains(link) {
                        work.push(*link);
                    }
                }
            }
            None => {
                let durable = store
                    .has(&id)
                    .map_err(|source| FaultError::ExistsCheck { id, source })?;
                if !durable {
                    return Err(FaultError::MissingChunk(id));
                }
            }
        }
    }

    Ok(live)
}
