//! Packed tag decoding.
//!
//! Every chunk on the image is followed by a spare area whose first sixteen
//! bytes hold the packed tag: four little-endian 32-bit words identifying the
//! chunk. The rest of the spare area carries ECC data, which is written by
//! the flash controller and carries no information for extraction.
//!
//! The `byte_count` word doubles as a chunk-kind discriminator. Two sentinel
//! values are reserved: `0xFFFF` marks an object header chunk and
//! `0xFFFF_FFFF` marks an erased chunk that was never programmed. Any other
//! value is the payload length of a file data chunk. The sentinels cannot
//! collide with real lengths because no supported layout has a chunk data
//! area of 65535 bytes or more.

use serde::{Deserialize, Serialize};
use yex_types::{
    read_le_u32, ObjectId, ParseError, EMPTY_CHUNK_SENTINEL, HEADER_CHUNK_SENTINEL, PACKED_TAG_LEN,
};

/// Packed tag occupying the head of a chunk's spare area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedTag {
    /// Allocation-order sequence number of the containing block.
    pub sequence_number: u32,
    /// Object this chunk belongs to.
    pub object_id: ObjectId,
    /// Position of the chunk within the object: 0 for a header, 1-based for
    /// file data.
    pub chunk_id: u32,
    /// Kind discriminator; see [`PackedTag::kind`].
    pub byte_count: u32,
}

/// What a chunk holds, as declared by its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    /// Object header chunk describing a file-tree entry.
    Header,
    /// File data chunk carrying `len` payload bytes.
    Data { len: u32 },
    /// Erased chunk, never programmed.
    Empty,
}

impl PackedTag {
    /// Decode a packed tag from the head of a spare area.
    pub fn parse(spare: &[u8]) -> Result<Self, ParseError> {
        if spare.len() < PACKED_TAG_LEN {
            return Err(ParseError::InsufficientData {
                needed: PACKED_TAG_LEN,
                offset: 0,
                actual: spare.len(),
            });
        }

        Ok(Self {
            sequence_number: read_le_u32(spare, 0x00)?,
            object_id: ObjectId(read_le_u32(spare, 0x04)?),
            chunk_id: read_le_u32(spare, 0x08)?,
            byte_count: read_le_u32(spare, 0x0C)?,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ChunkKind {
        match self.byte_count {
            HEADER_CHUNK_SENTINEL => ChunkKind::Header,
            EMPTY_CHUNK_SENTINEL => ChunkKind::Empty,
            len => ChunkKind::Data { len },
        }
    }
}
