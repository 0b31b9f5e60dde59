use serde::{Deserialize, Serialize};

use loam_types::ChunkId;

use crate::error::{StoreError, StoreResult};

/// Domain tag hashed ahead of the canonical encoding when deriving chunk ids.
const CHUNK_DOMAIN: &[u8] = b"loam-chunk-v1:";

/// Compute the content address of a canonical chunk encoding.
pub fn chunk_id(canonical: &[u8]) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CHUNK_DOMAIN);
    hasher.update(canonical);
    ChunkId::from_hash(*hasher.finalize().as_bytes())
}

/// Builder-side form of a chunk: an opaque payload plus the identifiers of
/// the chunks it links to.
///
/// Actors construct a `ChunkData`, encode it with [`ChunkData::to_bytes`],
/// and hand the bytes to their staged storage. Link order is part of the
/// content, so reordering links changes the resulting identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkData {
    /// Opaque payload. The storage layer never interprets it.
    pub payload: Vec<u8>,
    /// Chunks this chunk references.
    pub links: Vec<ChunkId>,
}

impl ChunkData {
    /// Create a chunk from payload and links.
    pub fn new(payload: Vec<u8>, links: Vec<ChunkId>) -> Self {
        Self { payload, links }
    }

    /// Create a chunk with no outgoing links.
    pub fn leaf(payload: Vec<u8>) -> Self {
        Self {
            payload,
            links: Vec::new(),
        }
    }

    /// The canonical encoding of this chunk.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// A decoded, content-addressed chunk.
///
/// Produced by [`Chunk::decode`], which parses untrusted bytes, re-encodes
/// them canonically, and derives the identifier from the canonical form.
/// Holding a `Chunk` therefore proves its id matches its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    id: ChunkId,
    raw: Vec<u8>,
    links: Vec<ChunkId>,
}

impl Chunk {
    /// Decode raw bytes into a verified chunk.
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not a valid chunk
    /// encoding. The id always addresses the canonical re-encoding, so
    /// trailing garbage in the input does not produce a distinct identity.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let data: ChunkData =
            bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        let raw = data.to_bytes()?;
        let id = chunk_id(&raw);
        Ok(Self {
            id,
            raw,
            links: data.links,
        })
    }

    /// The chunk's content address.
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// The canonical encoded bytes.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Identifiers of the chunks this chunk links to.
    pub fn links(&self) -> &[ChunkId] {
        &self.links
    }
}
