//! Content-addressed chunk storage for Loam.
//!
//! This crate defines the unit of actor state, the [`Chunk`], and the durable
//! store beneath the staging layer. Every chunk is immutable and identified
//! by the BLAKE3 hash of its canonical encoding (domain-separated from other
//! Loam hashes).
//!
//! # Chunk Model
//!
//! - [`ChunkData`] -- payload plus links, the form actors construct
//! - [`Chunk`] -- decoded and verified, id bound to the canonical bytes
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A chunk never changes once written; its id is its content.
//! 2. Not-found is data, not failure: reads return `Ok(None)` for absent ids.
//! 3. Readers never block each other (immutability makes shared reads safe).
//! 4. Batched writes land atomically or better per call.
//! 5. The store never looks inside a chunk -- links live in the staging layer.
//! 6. Backend failures reach the caller as errors, never as silent absence.

pub mod chunk;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use chunk::{chunk_id, Chunk, ChunkData};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryChunkStore;
pub use traits::ChunkStore;
