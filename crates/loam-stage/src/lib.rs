//! Per-actor staged storage for the Loam execution layer.
//!
//! During execution every actor writes through a private stage: chunks are
//! buffered in memory, reads see the stage before the durable store, and
//! nothing becomes durable until flush. Moving an actor's head is a
//! compare-and-swap guarded by a completeness check of the proposed state
//! graph, so a committed head always resolves fully.
//!
//! # Key Types
//!
//! - [`StorageSession`] — per-execution-context registry; owns the actor
//!   records handed in by the executor and the shared durable store handle
//! - [`ActorStorage`] — one actor's staged storage: put/get, head
//!   compare-and-swap, prune, flush
//! - [`StageError`] / [`FaultError`] — recoverable vs fatal failure split
//!
//! # Lifecycle
//!
//! 1. The executor creates one [`StorageSession`] per execution context
//!    (typically one block).
//! 2. Each actor invocation borrows its storage via
//!    [`StorageSession::get_or_create`].
//! 3. The actor stages writes, commits a new head, optionally prunes.
//! 4. After all invocations, [`StorageSession::flush_all`] persists every
//!    actor's live graph.

pub mod error;
mod reach;
pub mod session;
pub mod storage;

pub use error::{FaultError, StageError, StageResult};
pub use session::StorageSession;
pub use storage::ActorStorage;
