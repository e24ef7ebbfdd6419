//! Object header decoding.
//!
//! A header chunk's data area opens with a fixed little-endian record that
//! describes one file-tree entry: its type, its parent, its name, and the
//! POSIX metadata to restore. The record is `0x1D0` bytes; the rest of the
//! chunk is padding left at the erased value.
//!
//! Two fields are decoded but deliberately unused downstream: the checksum
//! (legacy, never validated by real images) and `ctime` (not restorable
//! through portable host interfaces). Writers pad the name and alias fields
//! with NULs, so both are cut at the first NUL and clamped to their maximum
//! lengths.

use serde::{Deserialize, Serialize};
use yex_types::{
    ensure_slice, nul_terminated, read_le_i32, read_le_u32, ObjectId, ParseError, MAX_ALIAS_LEN,
    MAX_NAME_LEN, OBJECT_HEADER_MIN_LEN,
};

/// File-tree entry kind stored in an object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Unknown,
    File,
    Symlink,
    Directory,
    Hardlink,
    Special,
}

impl ObjectType {
    /// Decode the on-flash type word. Values past the defined range mean the
    /// chunk is not a real header.
    pub fn from_raw(raw: u32) -> Result<Self, ParseError> {
        Ok(match raw {
            0 => Self::Unknown,
            1 => Self::File,
            2 => Self::Symlink,
            3 => Self::Directory,
            4 => Self::Hardlink,
            5 => Self::Special,
            _ => {
                return Err(ParseError::InvalidField {
                    field: "object_type",
                    reason: "value out of range",
                })
            }
        })
    }

    /// Whether this is one of the five concrete entry kinds. `Unknown` is
    /// representable on flash but never describes an extractable entry.
    #[must_use]
    pub fn is_concrete(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Decoded object header record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub parent_id: ObjectId,
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: u32,
    pub mtime: u32,
    /// Declared file length. Stored signed on flash; negative values decode
    /// to zero.
    pub file_size: u64,
    /// Target of a hardlink entry.
    pub equivalent_id: ObjectId,
    /// Target path of a symlink entry.
    pub alias: String,
    /// Device number of a special entry.
    pub rdev: u32,
}

impl ObjectHeader {
    /// Decode an object header from the start of a header chunk's data area.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < OBJECT_HEADER_MIN_LEN {
            return Err(ParseError::InsufficientData {
                needed: OBJECT_HEADER_MIN_LEN,
                offset: 0,
                actual: data.len(),
            });
        }

        let object_type = ObjectType::from_raw(read_le_u32(data, 0x00)?)?;
        let parent_id = ObjectId(read_le_u32(data, 0x04)?);
        // 0x08: u16 name checksum, legacy and ignored.
        let name_field = ensure_slice(data, 0x0A, 0x100)?;
        let name = nul_terminated(&name_field[..MAX_NAME_LEN]);
        // 0x10A: two alignment bytes.
        let mode = read_le_u32(data, 0x10C)?;
        let uid = read_le_u32(data, 0x110)?;
        let gid = read_le_u32(data, 0x114)?;
        let atime = read_le_u32(data, 0x118)?;
        let mtime = read_le_u32(data, 0x11C)?;
        // 0x120: ctime, not restorable portably.
        let file_size = read_le_i32(data, 0x124)?.max(0) as u64;
        let equivalent_id = ObjectId(read_le_u32(data, 0x128)?);
        let alias_field = ensure_slice(data, 0x12C, 0xA0)?;
        let alias = nul_terminated(&alias_field[..MAX_ALIAS_LEN]);
        let rdev = read_le_u32(data, 0x1CC)?;

        Ok(Self {
            object_type,
            parent_id,
            name,
            mode,
            uid,
            gid,
            atime,
            mtime,
            file_size,
            equivalent_id,
            alias,
            rdev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_str(buf: &mut [u8], offset: usize, value: &str) {
        buf[offset..offset + value.len()].copy_from_slice(value.as_bytes());
    }

    fn header_buf(object_type: u32) -> Vec<u8> {
        let mut buf = vec![0xFF_u8; OBJECT_HEADER_MIN_LEN];
        put_u32(&mut buf, 0x00, object_type);
        put_u32(&mut buf, 0x04, 1);
        buf[0x0A..0x10A].fill(0);
        put_str(&mut buf, 0x0A, "entry");
        put_u32(&mut buf, 0x10C, 0o100_644);
        put_u32(&mut buf, 0x110, 1000);
        put_u32(&mut buf, 0x114, 100);
        put_u32(&mut buf, 0x118, 1_600_000_000);
        put_u32(&mut buf, 0x11C, 1_600_000_100);
        put_u32(&mut buf, 0x120, 1_600_000_200);
        put_u32(&mut buf, 0x124, 4096);
        put_u32(&mut buf, 0x128, 0);
        buf[0x12C..0x1CC].fill(0);
        put_u32(&mut buf, 0x1CC, 0);
        buf
    }

    #[test]
    fn parses_every_field_at_its_offset() {
        let mut buf = header_buf(1);
        put_u32(&mut buf, 0x04, 37);
        put_u32(&mut buf, 0x128, 12);
        put_str(&mut buf, 0x12C, "../target");
        put_u32(&mut buf, 0x1CC, 0x0502);

        let header = ObjectHeader::parse(&buf).expect("header");
        assert_eq!(header.object_type, ObjectType::File);
        assert_eq!(header.parent_id, ObjectId(37));
        assert_eq!(header.name, "entry");
        assert_eq!(header.mode, 0o100_644);
        assert_eq!(header.uid, 1000);
        assert_eq!(header.gid, 100);
        assert_eq!(header.atime, 1_600_000_000);
        assert_eq!(header.mtime, 1_600_000_100);
        assert_eq!(header.file_size, 4096);
        assert_eq!(header.equivalent_id, ObjectId(12));
        assert_eq!(header.alias, "../target");
        assert_eq!(header.rdev, 0x0502);
    }

    #[test]
    fn negative_file_size_decodes_to_zero() {
        let mut buf = header_buf(1);
        put_u32(&mut buf, 0x124, 0xFFFF_FFFF);
        let header = ObjectHeader::parse(&buf).expect("header");
        assert_eq!(header.file_size, 0);
    }

    #[test]
    fn name_and_alias_are_clamped() {
        let mut buf = header_buf(2);
        // Name field filled end to end with no terminator.
        buf[0x0A..0x10A].fill(b'n');
        buf[0x12C..0x1CC].fill(b'a');
        let header = ObjectHeader::parse(&buf).expect("header");
        assert_eq!(header.name.len(), MAX_NAME_LEN);
        assert_eq!(header.alias.len(), MAX_ALIAS_LEN);
    }

    #[test]
    fn type_out_of_range_is_rejected() {
        let buf = header_buf(6);
        let err = ObjectHeader::parse(&buf).expect_err("bad type");
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "object_type",
                ..
            }
        ));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let buf = header_buf(3);
        let err = ObjectHeader::parse(&buf[..0x1CF]).expect_err("short");
        assert_eq!(
            err,
            ParseError::InsufficientData {
                needed: OBJECT_HEADER_MIN_LEN,
                offset: 0,
                actual: 0x1CF
            }
        );
    }

    #[test]
    fn undecodable_name_bytes_are_replaced() {
        let mut buf = header_buf(1);
        buf[0x0A] = 0xC3;
        buf[0x0B] = 0x28;
        buf[0x0C] = 0;
        let header = ObjectHeader::parse(&buf).expect("header");
        assert_eq!(header.name, "\u{FFFD}(");
    }
}
