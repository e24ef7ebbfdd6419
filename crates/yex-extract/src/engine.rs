//! The chunk-stream state machine.
//!
//! One forward pass over the image drives everything. Header chunks open
//! objects: the entry is recorded in the table and, when extracting,
//! materialized on the host. A file header is followed immediately by its
//! data chunks, which are consumed inline with strict continuity checks.
//! Anything else at the top level is either an erased chunk (skipped) or a
//! stray data chunk, tolerated with a warning up to a give-up threshold.
//!
//! Listing runs the same pass against a discarding host, so a listed image
//! gets the same structural validation an extracted one does, except that
//! hardlinks to unknown objects are reported rather than fatal: nothing is
//! being created, so there is nothing to link to.
//!
//! Directory timestamps are restored last, newest directory first, after the
//! pass has stopped writing into them.

use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use yex_error::{ExtractError, Result};
use yex_host::{mknod_refused, HostFs, NullHost};
use yex_ondisk::{ChunkKind, ObjectHeader, ObjectType, PackedTag};
use yex_types::{ObjectId, MAX_STREAM_WARNINGS, PERM_MODE_MASK, SPECIAL_MODE_BITS};

use crate::listing::ListEntry;
use crate::reader::ChunkReader;
use crate::table::ObjectTable;

/// Counters accumulated over one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub chunks: u64,
    pub objects: u64,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub specials: u64,
    pub unknown: u64,
    pub bytes_written: u64,
    pub stray_chunks: u32,
    pub host_warnings: u32,
}

/// Extract every object in the image into `host`.
pub fn extract<R: Read, H: HostFs>(reader: ChunkReader<R>, host: H) -> Result<Report> {
    let session = Session {
        reader,
        host,
        table: ObjectTable::new(),
        report: Report::default(),
        mode: Mode::Extract,
        entries: Vec::new(),
    };
    let (report, _) = session.run()?;
    Ok(report)
}

/// Walk the image without writing anything, returning its entries in
/// image order.
pub fn list<R: Read>(reader: ChunkReader<R>) -> Result<(Vec<ListEntry>, Report)> {
    let session = Session {
        reader,
        host: NullHost,
        table: ObjectTable::new(),
        report: Report::default(),
        mode: Mode::List,
        entries: Vec::new(),
    };
    let (report, entries) = session.run()?;
    Ok((entries, report))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Extract,
    List,
}

struct Session<R, H: HostFs> {
    reader: ChunkReader<R>,
    host: H,
    table: ObjectTable,
    report: Report,
    mode: Mode,
    entries: Vec<ListEntry>,
}

impl<R: Read, H: HostFs> Session<R, H> {
    fn run(mut self) -> Result<(Report, Vec<ListEntry>)> {
        while let Some((tag, header)) = self.next_object()? {
            self.process(tag, header)?;
        }
        self.restore_dir_times();
        self.report.chunks = self.reader.chunks_read();
        info!(
            objects = self.report.objects,
            bytes = self.report.bytes_written,
            chunks = self.report.chunks,
            "image processed"
        );
        Ok((self.report, self.entries))
    }

    /// Advance to the next header chunk, skipping erased chunks and
    /// tolerating a bounded number of strays.
    fn next_object(&mut self) -> Result<Option<(PackedTag, ObjectHeader)>> {
        loop {
            let chunk_no = self.reader.chunks_read() + 1;
            let Some(record) = self.reader.next_record()? else {
                return Ok(None);
            };
            let tag = PackedTag::parse(record.spare)?;
            match tag.kind() {
                ChunkKind::Empty => {}
                ChunkKind::Data { .. } => {
                    warn!(chunk = chunk_no, "chunk without an object header, skipping");
                    self.report.stray_chunks += 1;
                    if self.report.stray_chunks >= MAX_STREAM_WARNINGS {
                        return Err(ExtractError::TooManyStrayChunks {
                            count: self.report.stray_chunks,
                        });
                    }
                }
                ChunkKind::Header => {
                    let header = ObjectHeader::parse(record.data)?;
                    return Ok(Some((tag, header)));
                }
            }
        }
    }

    fn process(&mut self, tag: PackedTag, header: ObjectHeader) -> Result<()> {
        let id = tag.object_id;
        let path = self.table.insert(id, &header)?.path.clone();
        self.report.objects += 1;

        match self.mode {
            Mode::List => self.record_entry(id, &header, &path)?,
            Mode::Extract => self.materialize(id, &header, &path)?,
        }

        match header.object_type {
            ObjectType::File => self.report.files += 1,
            ObjectType::Directory => self.report.directories += 1,
            ObjectType::Symlink => self.report.symlinks += 1,
            ObjectType::Hardlink => self.report.hardlinks += 1,
            ObjectType::Special => self.report.specials += 1,
            ObjectType::Unknown => self.report.unknown += 1,
        }
        Ok(())
    }

    fn materialize(&mut self, id: ObjectId, header: &ObjectHeader, path: &str) -> Result<()> {
        info!(path, kind = ?header.object_type, "extracting");
        let rel = host_rel(path);

        match header.object_type {
            ObjectType::File => {
                let mut out = self
                    .host
                    .create_file(rel, header.mode & PERM_MODE_MASK)
                    .map_err(|e| fatal("create file", rel, e))?;
                let written = self.stream_file(id, header.file_size, Some(&mut out), path)?;
                drop(out);
                self.report.bytes_written += written;

                self.restore_owner(rel, header);
                if header.mode & SPECIAL_MODE_BITS != 0 {
                    self.restore_mode(rel, header);
                }
                self.restore_times(rel, header.atime, header.mtime);
            }
            ObjectType::Symlink => {
                self.host
                    .symlink(&header.alias, rel)
                    .map_err(|e| fatal("create symlink", rel, e))?;
                self.restore_owner(rel, header);
                self.restore_times(rel, header.atime, header.mtime);
            }
            ObjectType::Directory => {
                if id != ObjectId::ROOT {
                    self.host
                        .create_dir(rel, header.mode & PERM_MODE_MASK)
                        .map_err(|e| fatal("create directory", rel, e))?;
                }
                self.restore_owner(rel, header);
                if id == ObjectId::ROOT || header.mode & SPECIAL_MODE_BITS != 0 {
                    self.restore_mode(rel, header);
                }
                // Timestamps deferred; children are still to come.
            }
            ObjectType::Hardlink => {
                let target = self
                    .table
                    .get(header.equivalent_id)
                    .ok_or(ExtractError::MissingLinkTarget {
                        id,
                        target: header.equivalent_id,
                    })?
                    .path
                    .clone();
                self.host
                    .hardlink(host_rel(&target), rel)
                    .map_err(|e| fatal("create hardlink", rel, e))?;
                // The link shares the target's metadata; nothing to restore.
            }
            ObjectType::Special => {
                match self.host.mknod(rel, header.mode, u64::from(header.rdev)) {
                    Ok(()) => {
                        self.restore_owner(rel, header);
                        self.restore_times(rel, header.atime, header.mtime);
                    }
                    Err(error) if mknod_refused(&error) => {
                        warn!(path = rel, error = %error, "cannot create device node");
                        self.report.host_warnings += 1;
                    }
                    Err(error) => return Err(fatal("create device", rel, error)),
                }
            }
            ObjectType::Unknown => {}
        }
        Ok(())
    }

    fn record_entry(&mut self, id: ObjectId, header: &ObjectHeader, path: &str) -> Result<()> {
        let entry = if header.object_type == ObjectType::Hardlink {
            let target = self
                .table
                .get(header.equivalent_id)
                .map(|t| (t.path.clone(), t.mtime));
            ListEntry::hardlink(path, header, target)
        } else {
            ListEntry::node(path, header)
        };
        self.entries.push(entry);

        if header.object_type == ObjectType::File {
            self.stream_file(id, header.file_size, None, path)?;
        }
        Ok(())
    }

    /// Consume the data chunks of one file. Every chunk must belong to the
    /// file, appear in order, and be filled to capacity or to the file's
    /// remaining length; a well-formed image has no other shape.
    fn stream_file(
        &mut self,
        id: ObjectId,
        size: u64,
        mut out: Option<&mut H::File>,
        path: &str,
    ) -> Result<u64> {
        let chunk_size = self.reader.layout().chunk_size() as u64;
        let mut remaining = size;
        let mut expected_chunk = 1_u32;
        let mut written = 0_u64;

        while remaining > 0 {
            let Some(record) = self.reader.next_record()? else {
                return Err(ExtractError::broken(format!(
                    "file {path} is cut off by the end of the image"
                )));
            };
            let tag = PackedTag::parse(record.spare)?;

            let len = match tag.kind() {
                ChunkKind::Data { len } => u64::from(len),
                _ => {
                    return Err(ExtractError::broken(format!(
                        "file {path} is interrupted by a non-data chunk"
                    )))
                }
            };
            if tag.object_id != id {
                return Err(ExtractError::broken(format!(
                    "file {path} is interleaved with object {}",
                    tag.object_id
                )));
            }
            if tag.chunk_id != expected_chunk {
                return Err(ExtractError::broken(format!(
                    "file {path} continues with chunk {}, expected {expected_chunk}",
                    tag.chunk_id
                )));
            }
            let take = remaining.min(chunk_size);
            if len != take {
                return Err(ExtractError::broken(format!(
                    "file {path} chunk {expected_chunk} carries {len} bytes, expected {take}"
                )));
            }

            if let Some(file) = out.as_deref_mut() {
                file.write_all(&record.data[..take as usize])
                    .map_err(|e| fatal("write file", path, e))?;
            }
            written += take;
            remaining -= take;
            expected_chunk += 1;
        }
        Ok(written)
    }

    fn restore_dir_times(&mut self) {
        if self.mode == Mode::List {
            return;
        }
        let dirs: Vec<(String, u32, u32)> = self
            .table
            .dir_chain()
            .map(|o| (o.path.clone(), o.atime, o.mtime))
            .collect();
        for (path, atime, mtime) in dirs {
            let result = self.host.set_times(host_rel(&path), atime, mtime);
            self.note_host_result("set times", host_rel(&path), result);
        }
    }

    fn restore_owner(&mut self, rel: &str, header: &ObjectHeader) {
        let result = self.host.lchown(rel, header.uid, header.gid);
        self.note_host_result("set owner", rel, result);
    }

    fn restore_mode(&mut self, rel: &str, header: &ObjectHeader) {
        let result = self
            .host
            .chmod(rel, header.mode & (PERM_MODE_MASK | SPECIAL_MODE_BITS));
        self.note_host_result("set mode", rel, result);
    }

    fn restore_times(&mut self, rel: &str, atime: u32, mtime: u32) {
        let result = self.host.set_times(rel, atime, mtime);
        self.note_host_result("set times", rel, result);
    }

    fn note_host_result(&mut self, op: &'static str, path: &str, result: io::Result<()>) {
        if let Err(error) = result {
            warn!(op, path, error = %error, "cannot restore metadata");
            self.report.host_warnings += 1;
        }
    }
}

/// Table paths use `.` for the root; the host seam uses the empty string.
fn host_rel(path: &str) -> &str {
    if path == "." {
        ""
    } else {
        path
    }
}

fn fatal(op: &'static str, path: &str, source: io::Error) -> ExtractError {
    ExtractError::HostOp {
        op,
        path: PathBuf::from(path),
        source,
    }
}
