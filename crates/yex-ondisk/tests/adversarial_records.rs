//! Decoder behavior on hostile input: anything short of a well-formed record
//! must come back as a clean `ParseError`, never a panic and never a
//! half-decoded value.

use yex_ondisk::{ChunkKind, ObjectHeader, ObjectType, PackedTag};
use yex_types::{ParseError, OBJECT_HEADER_MIN_LEN, PACKED_TAG_LEN};

#[test]
fn tag_parse_never_panics_on_short_input() {
    for len in 0..PACKED_TAG_LEN {
        let err = PackedTag::parse(&vec![0xA5; len]).expect_err("short spare");
        assert!(matches!(err, ParseError::InsufficientData { .. }));
    }
}

#[test]
fn header_parse_never_panics_on_short_input() {
    // Walk the truncation point across every field boundary.
    for len in [0, 3, 4, 0x0A, 0x109, 0x10C, 0x124, 0x12C, 0x1CB, 0x1CF] {
        let err = ObjectHeader::parse(&vec![0_u8; len]).expect_err("short record");
        assert!(matches!(err, ParseError::InsufficientData { .. }));
    }
}

#[test]
fn erased_data_area_is_not_a_header() {
    // A chunk left at the erased value decodes as type 0xFFFFFFFF.
    let err = ObjectHeader::parse(&vec![0xFF_u8; OBJECT_HEADER_MIN_LEN]).expect_err("erased");
    assert!(matches!(err, ParseError::InvalidField { .. }));
}

#[test]
fn every_defined_type_value_round_trips() {
    let expected = [
        ObjectType::Unknown,
        ObjectType::File,
        ObjectType::Symlink,
        ObjectType::Directory,
        ObjectType::Hardlink,
        ObjectType::Special,
    ];
    for (raw, want) in expected.iter().enumerate() {
        assert_eq!(ObjectType::from_raw(raw as u32).expect("defined"), *want);
    }
    for raw in [6_u32, 7, 100, u32::MAX] {
        assert!(ObjectType::from_raw(raw).is_err());
    }
}

#[test]
fn zeroed_spare_decodes_as_zero_length_data() {
    let tag = PackedTag::parse(&[0_u8; PACKED_TAG_LEN]).expect("tag");
    assert_eq!(tag.kind(), ChunkKind::Data { len: 0 });
    assert_eq!(tag.chunk_id, 0);
}
