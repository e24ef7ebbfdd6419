//! Synthetic image construction.
//!
//! Tests and benchmarks need images with precisely known shapes, including
//! shapes no honest image writer would produce. [`ImageBuilder`] appends one
//! record at a time and leaves every policy decision to the caller;
//! [`HeaderSpec`] describes one object header and defaults to plausible
//! values so tests only spell out what they are probing.
//!
//! Builders panic on misuse (a name that cannot fit the header record, a
//! payload larger than a chunk); they are test tooling, not a parser.

#![forbid(unsafe_code)]

use yex_types::{Layout, HEADER_CHUNK_SENTINEL, MAX_ALIAS_LEN, MAX_NAME_LEN};

/// One object header, field by field, with builder-style overrides.
#[derive(Debug, Clone)]
pub struct HeaderSpec {
    raw_type: u32,
    parent: u32,
    name: String,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: u32,
    mtime: u32,
    file_size: i32,
    equivalent: u32,
    alias: String,
    rdev: u32,
}

impl HeaderSpec {
    fn base(raw_type: u32, parent: u32, name: &str, mode: u32) -> Self {
        Self {
            raw_type,
            parent,
            name: name.to_owned(),
            mode,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            file_size: 0,
            equivalent: 0,
            alias: String::new(),
            rdev: 0,
        }
    }

    /// A header for the pre-existing root directory.
    #[must_use]
    pub fn root() -> Self {
        Self::base(3, 1, "", 0o040_755)
    }

    #[must_use]
    pub fn dir(parent: u32, name: &str) -> Self {
        Self::base(3, parent, name, 0o040_755)
    }

    #[must_use]
    pub fn file(parent: u32, name: &str) -> Self {
        Self::base(1, parent, name, 0o100_644)
    }

    #[must_use]
    pub fn symlink(parent: u32, name: &str, target: &str) -> Self {
        let mut spec = Self::base(2, parent, name, 0o120_777);
        spec.alias = target.to_owned();
        spec
    }

    #[must_use]
    pub fn hardlink(parent: u32, name: &str, equivalent: u32) -> Self {
        let mut spec = Self::base(4, parent, name, 0o100_600);
        spec.equivalent = equivalent;
        spec
    }

    #[must_use]
    pub fn special(parent: u32, name: &str, mode: u32, rdev: u32) -> Self {
        let mut spec = Self::base(5, parent, name, mode);
        spec.rdev = rdev;
        spec
    }

    /// Override the full mode word, type bits included.
    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    #[must_use]
    pub fn times(mut self, atime: u32, mtime: u32) -> Self {
        self.atime = atime;
        self.mtime = mtime;
        self
    }

    /// Override the declared file length, independent of any data chunks.
    #[must_use]
    pub fn size(mut self, file_size: i32) -> Self {
        self.file_size = file_size;
        self
    }

    /// Override the raw type word, including values no header should carry.
    #[must_use]
    pub fn raw_type(mut self, raw_type: u32) -> Self {
        self.raw_type = raw_type;
        self
    }
}

/// Appends records to an in-memory image.
pub struct ImageBuilder {
    layout: Layout,
    buf: Vec<u8>,
    sequence: u32,
}

impl ImageBuilder {
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            buf: Vec::new(),
            sequence: 1,
        }
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Append a header chunk for `id`.
    pub fn push_header(&mut self, id: u32, spec: &HeaderSpec) -> &mut Self {
        assert!(spec.name.len() <= MAX_NAME_LEN, "name too long for a header");
        assert!(
            spec.alias.len() <= MAX_ALIAS_LEN,
            "alias too long for a header"
        );

        let mut data = vec![0xFF_u8; self.layout.chunk_size()];
        put_u32(&mut data, 0x00, spec.raw_type);
        put_u32(&mut data, 0x04, spec.parent);
        // 0x08: legacy checksum, left erased like real writers leave it.
        data[0x0A..0x10C].fill(0);
        data[0x0A..0x0A + spec.name.len()].copy_from_slice(spec.name.as_bytes());
        put_u32(&mut data, 0x10C, spec.mode);
        put_u32(&mut data, 0x110, spec.uid);
        put_u32(&mut data, 0x114, spec.gid);
        put_u32(&mut data, 0x118, spec.atime);
        put_u32(&mut data, 0x11C, spec.mtime);
        put_u32(&mut data, 0x120, spec.mtime);
        put_u32(&mut data, 0x124, spec.file_size as u32);
        put_u32(&mut data, 0x128, spec.equivalent);
        data[0x12C..0x1CC].fill(0);
        data[0x12C..0x12C + spec.alias.len()].copy_from_slice(spec.alias.as_bytes());
        put_u32(&mut data, 0x1CC, spec.rdev);

        self.push_raw(&data, id, 0, HEADER_CHUNK_SENTINEL)
    }

    /// Append a file: its header followed by its data chunks, with the
    /// declared size taken from `contents`.
    pub fn push_file(&mut self, id: u32, spec: &HeaderSpec, contents: &[u8]) -> &mut Self {
        let mut spec = spec.clone();
        spec.file_size = i32::try_from(contents.len()).expect("file contents fit an image");
        self.push_header(id, &spec);
        for (index, part) in contents.chunks(self.layout.chunk_size()).enumerate() {
            self.push_data_chunk(id, index as u32 + 1, part);
        }
        self
    }

    /// Append one data chunk with `byte_count` taken from the payload.
    pub fn push_data_chunk(&mut self, id: u32, chunk_id: u32, payload: &[u8]) -> &mut Self {
        let mut data = vec![0xFF_u8; self.layout.chunk_size()];
        data[..payload.len()].copy_from_slice(payload);
        self.push_raw(&data, id, chunk_id, payload.len() as u32)
    }

    /// Append an erased record.
    pub fn push_empty(&mut self) -> &mut Self {
        self.buf.extend(std::iter::repeat(0xFF).take(self.layout.record_size()));
        self
    }

    /// Append a record with full control over the tag words.
    pub fn push_raw(
        &mut self,
        data: &[u8],
        object: u32,
        chunk_id: u32,
        byte_count: u32,
    ) -> &mut Self {
        assert!(
            data.len() <= self.layout.chunk_size(),
            "data area larger than a chunk"
        );
        self.buf.extend_from_slice(data);
        self.buf
            .extend(std::iter::repeat(0xFF).take(self.layout.chunk_size() - data.len()));

        let mut spare = vec![0xFF_u8; self.layout.spare_size()];
        put_u32(&mut spare, 0x00, self.sequence);
        put_u32(&mut spare, 0x04, object);
        put_u32(&mut spare, 0x08, chunk_id);
        put_u32(&mut spare, 0x0C, byte_count);
        self.buf.extend_from_slice(&spare);

        self.sequence += 1;
        self
    }

    /// The image built so far.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        self.buf.clone()
    }

    /// The image with its last `drop_bytes` cut off, for truncation tests.
    #[must_use]
    pub fn truncated(&self, drop_bytes: usize) -> Vec<u8> {
        let mut out = self.buf.clone();
        let keep = out.len().saturating_sub(drop_bytes);
        out.truncate(keep);
        out
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_record_size_multiples() {
        let layout = Layout::new(2048, 64).expect("layout");
        let mut image = ImageBuilder::new(layout);
        image
            .push_header(2, &HeaderSpec::dir(1, "d"))
            .push_file(3, &HeaderSpec::file(2, "f"), &[7; 5000])
            .push_empty();

        // Two headers, three data chunks (2048 + 2048 + 904), one erased record.
        assert_eq!(image.build().len(), 6 * layout.record_size());
    }

    #[test]
    fn file_size_field_tracks_contents() {
        let layout = Layout::new(2048, 64).expect("layout");
        let mut image = ImageBuilder::new(layout);
        image.push_file(2, &HeaderSpec::file(1, "f"), &[1, 2, 3]);

        let built = image.build();
        let size = u32::from_le_bytes(built[0x124..0x128].try_into().expect("slice"));
        assert_eq!(size, 3);
        // Tag of the single data chunk.
        let tag_at = 2 * layout.record_size() - layout.spare_size();
        let count = u32::from_le_bytes(
            built[tag_at + 12..tag_at + 16].try_into().expect("slice"),
        );
        assert_eq!(count, 3);
    }
}
