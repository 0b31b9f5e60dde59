//! Foundation types for Loam.
//!
//! This crate provides the identity and actor types used throughout the Loam
//! storage layer. Every other Loam crate depends on `loam-types`.
//!
//! # Key Types
//!
//! - [`ChunkId`] — Content-addressed chunk identifier (BLAKE3 hash)
//! - [`ActorAddress`] — Stable actor identity used to key staged storages
//! - [`ActorRecord`] — Actor entity whose head binds it to a state graph
//! - [`ActorTable`] — Per-session arena that owns actor records and mints
//!   [`ActorIdx`] handles

pub mod actor;
pub mod address;
pub mod chunk_id;
pub mod error;

pub use actor::{ActorIdx, ActorRecord, ActorTable};
pub use address::ActorAddress;
pub use chunk_id::ChunkId;
pub use error::TypeError;
