//! Flash layout detection.
//!
//! Nothing in the image states its chunk and spare sizes, so they are
//! recovered from the shape of the data. A real image opens with the root's
//! first child: a header chunk whose record parents to the root object and
//! carries a concrete entry type. That anchors two probes per candidate
//! layout:
//!
//! * the spare area of the first chunk must hold a header tag with
//!   `chunk_id` 0, and
//! * the spare area of the second chunk must hold another header tag, a
//!   continuation of the first object (`chunk_id` 1), or an erased tag.
//!
//! The erased case covers images whose single object fits in one chunk; the
//! read-ahead buffer is pre-filled with the erased value so a short image
//! probes the same as an erased tail. Candidates are tried smallest first,
//! which keeps a large-layout image from matching a smaller candidate by
//! accident: its first spare area would sit mid-data where real header
//! records keep NUL padding, not a header tag.

use std::io::Read;
use tracing::debug;
use yex_error::{ExtractError, Result};
use yex_ondisk::{ChunkKind, PackedTag};
use yex_types::{read_le_u32, Layout, ObjectId, READAHEAD_LEN};

use crate::reader::read_full;

/// Recover the layout from the head of an image. Returns the detected layout
/// together with the bytes consumed from the source, which the caller feeds
/// back into a [`crate::ChunkReader`] as its prefix.
pub fn detect_layout<R: Read>(source: &mut R) -> Result<(Layout, Vec<u8>)> {
    let mut buf = vec![0xFF_u8; READAHEAD_LEN];
    let len = read_full(source, &mut buf)?;

    // The record at offset zero must look like a first header before any
    // layout is even considered.
    let type_raw = read_le_u32(&buf, 0x00)?;
    let parent = ObjectId(read_le_u32(&buf, 0x04)?);
    if parent != ObjectId::ROOT || !(1..=5).contains(&type_raw) {
        return Err(ExtractError::NotAnImage);
    }

    for layout in Layout::detection_candidates() {
        let first = tag_at(&buf, layout.chunk_size())?;
        let second = tag_at(&buf, 2 * layout.chunk_size() + layout.spare_size())?;

        let first_is_header = first.kind() == ChunkKind::Header && first.chunk_id == 0;
        let second_fits = match second.kind() {
            ChunkKind::Header => second.chunk_id == 0,
            ChunkKind::Empty => true,
            ChunkKind::Data { .. } => {
                second.object_id == first.object_id && second.chunk_id == 1
            }
        };

        if first_is_header && second_fits {
            debug!(%layout, "layout probe matched");
            buf.truncate(len);
            return Ok((layout, buf));
        }
    }

    Err(ExtractError::LayoutUnknown)
}

fn tag_at(buf: &[u8], offset: usize) -> Result<PackedTag> {
    Ok(PackedTag::parse(yex_types::ensure_slice(
        buf,
        offset,
        yex_types::PACKED_TAG_LEN,
    )?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER_SENTINEL: u32 = 0xFFFF;

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_tag(buf: &mut [u8], offset: usize, object: u32, chunk: u32, count: u32) {
        put_u32(buf, offset, 1);
        put_u32(buf, offset + 4, object);
        put_u32(buf, offset + 8, chunk);
        put_u32(buf, offset + 12, count);
    }

    /// A plausible image head for the given layout: a first header chunk
    /// (type directory, parented to root) and a second header chunk.
    fn image_head(layout: Layout, records: usize) -> Vec<u8> {
        let mut buf = vec![0xFF_u8; records * layout.record_size()];
        put_u32(&mut buf, 0x00, 3);
        put_u32(&mut buf, 0x04, 1);
        put_tag(&mut buf, layout.chunk_size(), 257, 0, HEADER_SENTINEL);
        if records >= 2 {
            let second = layout.record_size();
            put_u32(&mut buf, second, 3);
            put_u32(&mut buf, second + 4, 1);
            put_tag(
                &mut buf,
                2 * layout.chunk_size() + layout.spare_size(),
                258,
                0,
                HEADER_SENTINEL,
            );
        }
        buf
    }

    #[test]
    fn detects_each_candidate_layout() {
        for layout in Layout::detection_candidates() {
            let image = image_head(layout, 2);
            let (found, prefix) = detect_layout(&mut Cursor::new(&image)).expect("detect");
            assert_eq!(found, layout);
            assert_eq!(prefix, image[..prefix.len()]);
        }
    }

    #[test]
    fn single_record_image_detects_via_erased_second_probe() {
        let layout = Layout::new(2048, 64).expect("layout");
        let image = image_head(layout, 1);
        let (found, prefix) = detect_layout(&mut Cursor::new(&image)).expect("detect");
        assert_eq!(found, layout);
        assert_eq!(prefix.len(), image.len());
    }

    #[test]
    fn data_continuation_satisfies_the_second_probe() {
        let layout = Layout::new(4096, 128).expect("layout");
        let mut image = vec![0xFF_u8; 3 * layout.record_size()];
        // First record: file header for object 300.
        put_u32(&mut image, 0x00, 1);
        put_u32(&mut image, 0x04, 1);
        put_tag(&mut image, layout.chunk_size(), 300, 0, HEADER_SENTINEL);
        // Second record: first data chunk of the same object.
        put_tag(
            &mut image,
            2 * layout.chunk_size() + layout.spare_size(),
            300,
            1,
            4096,
        );

        let (found, _) = detect_layout(&mut Cursor::new(&image)).expect("detect");
        assert_eq!(found, layout);
    }

    #[test]
    fn continuation_of_a_different_object_is_rejected() {
        let layout = Layout::new(2048, 64).expect("layout");
        let mut image = image_head(layout, 2);
        // Overwrite the second probe: data chunk of an unrelated object.
        put_tag(
            &mut image,
            2 * layout.chunk_size() + layout.spare_size(),
            999,
            1,
            2048,
        );

        let err = detect_layout(&mut Cursor::new(&image)).expect_err("mismatch");
        assert!(matches!(err, ExtractError::LayoutUnknown));
    }

    #[test]
    fn garbage_first_record_is_not_an_image() {
        let err = detect_layout(&mut Cursor::new(vec![0x00_u8; 8192])).expect_err("garbage");
        assert!(matches!(err, ExtractError::NotAnImage));

        // Parented to root but with an out-of-range type word.
        let layout = Layout::new(2048, 64).expect("layout");
        let mut image = image_head(layout, 2);
        put_u32(&mut image, 0x00, 9);
        let err = detect_layout(&mut Cursor::new(&image)).expect_err("bad type");
        assert!(matches!(err, ExtractError::NotAnImage));

        let err = detect_layout(&mut Cursor::new(Vec::<u8>::new())).expect_err("empty");
        assert!(matches!(err, ExtractError::NotAnImage));
    }

    #[test]
    fn unknown_type_word_fails_the_anchor_check() {
        let layout = Layout::new(2048, 64).expect("layout");
        let mut image = image_head(layout, 2);
        put_u32(&mut image, 0x00, 0);
        let err = detect_layout(&mut Cursor::new(&image)).expect_err("unknown type");
        assert!(matches!(err, ExtractError::NotAnImage));
    }
}
