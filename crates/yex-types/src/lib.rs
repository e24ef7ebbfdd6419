#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest chunk data area among the supported flash layouts.
pub const MAX_CHUNK_SIZE: usize = 16384;
/// Largest spare (tag) area among the supported flash layouts.
pub const MAX_SPARE_SIZE: usize = 512;

/// Read-ahead window used by layout detection: two records of the largest
/// layout, enough to see the first two spare areas of any candidate.
pub const READAHEAD_LEN: usize = 2 * (MAX_CHUNK_SIZE + MAX_SPARE_SIZE);

/// Bytes of the spare area occupied by the packed tag (ECC follows, ignored).
pub const PACKED_TAG_LEN: usize = 16;

/// Bytes of a chunk data area required to decode every object header field.
/// The on-flash record continues with reserved padding beyond this.
pub const OBJECT_HEADER_MIN_LEN: usize = 0x1D0;

/// Tag byte-count sentinel marking an object header chunk.
pub const HEADER_CHUNK_SENTINEL: u32 = 0xFFFF;
/// Tag byte-count sentinel marking an erased/empty chunk.
pub const EMPTY_CHUNK_SENTINEL: u32 = 0xFFFF_FFFF;

/// Maximum object name length (the on-flash field is one byte longer,
/// NUL-terminated).
pub const MAX_NAME_LEN: usize = 255;
/// Maximum symlink alias length.
pub const MAX_ALIAS_LEN: usize = 159;

/// Stray-chunk warnings tolerated before the stream is declared hopeless.
pub const MAX_STREAM_WARNINGS: u32 = 20;

// ── Mode bits ───────────────────────────────────────────────────────────────

/// File type mask within an on-flash mode word.
pub const S_IFMT: u32 = 0o170_000;
pub const S_IFSOCK: u32 = 0o140_000;
pub const S_IFLNK: u32 = 0o120_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFBLK: u32 = 0o060_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFCHR: u32 = 0o020_000;
pub const S_IFIFO: u32 = 0o010_000;

/// Ordinary rwx permission bits.
pub const PERM_MODE_MASK: u32 = 0o0777;
/// setuid / setgid / sticky bits, applied in a separate chmod pass.
pub const SPECIAL_MODE_BITS: u32 = 0o7000;

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Numeric identifier of a file-tree entry, stable for the image's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The pre-seeded root directory object.
    pub const ROOT: Self = Self(1);
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Flash layout ────────────────────────────────────────────────────────────

/// A validated (chunk size, spare size) pair.
///
/// The image does not declare its layout; it is recovered by heuristic
/// pattern matching over the first two chunks, or forced by the caller.
/// Only the four candidates below are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    chunk_size: usize,
    spare_size: usize,
}

const CANDIDATES: [(usize, usize); 4] = [(2048, 64), (4096, 128), (8192, 256), (16384, 512)];

impl Layout {
    /// Create a `Layout` if the pair is one of the supported candidates.
    pub fn new(chunk_size: usize, spare_size: usize) -> Result<Self, ParseError> {
        if !CANDIDATES.contains(&(chunk_size, spare_size)) {
            return Err(ParseError::InvalidField {
                field: "layout",
                reason: "not a supported chunk/spare size pair",
            });
        }
        Ok(Self {
            chunk_size,
            spare_size,
        })
    }

    /// Candidate layout by 1-based index, in detection preference order.
    #[must_use]
    pub fn candidate(index: usize) -> Option<Self> {
        let (chunk_size, spare_size) = *CANDIDATES.get(index.checked_sub(1)?)?;
        Some(Self {
            chunk_size,
            spare_size,
        })
    }

    /// All candidates in detection preference order (smallest first).
    #[must_use]
    pub fn detection_candidates() -> [Self; 4] {
        CANDIDATES.map(|(chunk_size, spare_size)| Self {
            chunk_size,
            spare_size,
        })
    }

    #[must_use]
    pub fn chunk_size(self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn spare_size(self) -> usize {
        self.spare_size
    }

    /// Bytes occupied by one chunk on the image: data area plus spare area.
    #[must_use]
    pub fn record_size(self) -> usize {
        self.chunk_size + self.spare_size
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chunk_size, self.spare_size)
    }
}

// ── Decode errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Byte-range read helpers ─────────────────────────────────────────────────

pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_le_i32(data: &[u8], offset: usize) -> Result<i32, ParseError> {
    read_le_u32(data, offset).map(|v| v as i32)
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a fixed-width NUL-terminated byte field. Bytes past the first NUL
/// are padding; a field with no NUL uses its full width. Invalid UTF-8 is
/// replaced rather than rejected, matching how names come off real flash.
#[must_use]
pub fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
