//! Record-at-a-time image reading.
//!
//! An image is consumed strictly forward, one record (chunk data area plus
//! spare area) per call. The reader tolerates interrupted and partial reads,
//! accepts a clean end of image on a record boundary, and rejects a trailing
//! fragment: an image that stops inside a record was truncated by whatever
//! produced it.
//!
//! Layout detection reads ahead of the first record, so the reader can be
//! seeded with the already-consumed prefix and drains it before touching the
//! underlying source again.

use std::io::{self, ErrorKind, Read};
use yex_error::{ExtractError, Result};
use yex_types::Layout;

/// One decoded record position: the chunk data area and its spare area.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub data: &'a [u8],
    pub spare: &'a [u8],
}

pub struct ChunkReader<R> {
    inner: R,
    layout: Layout,
    prefix: Vec<u8>,
    prefix_pos: usize,
    record: Vec<u8>,
    chunks_read: u64,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, layout: Layout) -> Self {
        Self::with_prefix(inner, layout, Vec::new())
    }

    /// Build a reader that first drains `prefix`, the bytes layout detection
    /// pulled off the source.
    pub fn with_prefix(inner: R, layout: Layout, prefix: Vec<u8>) -> Self {
        Self {
            inner,
            layout,
            prefix,
            prefix_pos: 0,
            record: vec![0; layout.record_size()],
            chunks_read: 0,
        }
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Records consumed so far, counting the one most recently returned.
    #[must_use]
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Read the next record. `Ok(None)` is a clean end of image.
    pub fn next_record(&mut self) -> Result<Option<Record<'_>>> {
        let len = self.record.len();
        let mut filled = 0;

        if self.prefix_pos < self.prefix.len() {
            let take = (self.prefix.len() - self.prefix_pos).min(len);
            self.record[..take]
                .copy_from_slice(&self.prefix[self.prefix_pos..self.prefix_pos + take]);
            self.prefix_pos += take;
            filled = take;
        }

        if filled < len {
            filled += read_full(&mut self.inner, &mut self.record[filled..])?;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled != len {
            return Err(ExtractError::broken("image ends inside a record"));
        }

        self.chunks_read += 1;
        let (data, spare) = self.record.split_at(self.layout.chunk_size());
        Ok(Some(Record { data, spare }))
    }
}

/// Fill `buf` as far as the source allows, retrying interrupted reads.
/// Returns the number of bytes read; short only at end of input.
pub(crate) fn read_full<R: Read>(inner: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
