//! Host filesystem seam.
//!
//! Extraction talks to the destination tree through [`HostFs`], which keeps
//! the chunk-stream engine free of I/O policy and lets tests and dry runs
//! substitute the destination wholesale. [`LocalHost`] is the real
//! implementation, rooted at the extraction directory; [`NullHost`] discards
//! everything and backs listing runs.
//!
//! All paths crossing this seam are relative to the extraction root, with
//! the empty string naming the root itself. Operations never follow
//! symlinks when restoring metadata, so a hostile image cannot redirect a
//! chown or timestamp write outside the destination.

use std::ffi::CString;
use std::fs;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Destination-tree operations needed to materialize one image.
pub trait HostFs {
    /// Open file handle; dropped to close.
    type File: Write;

    /// Create a directory with the given permission bits.
    fn create_dir(&self, rel: &str, mode: u32) -> io::Result<()>;

    /// Create (or truncate) a regular file with the given permission bits.
    fn create_file(&self, rel: &str, mode: u32) -> io::Result<Self::File>;

    /// Create a symlink at `rel` pointing at `target`, verbatim.
    fn symlink(&self, target: &str, rel: &str) -> io::Result<()>;

    /// Create a hard link at `rel` to the already-extracted `existing`.
    fn hardlink(&self, existing: &str, rel: &str) -> io::Result<()>;

    /// Create a device node, FIFO, or socket.
    fn mknod(&self, rel: &str, mode: u32, rdev: u64) -> io::Result<()>;

    /// Set the full mode word, including setuid/setgid/sticky bits.
    fn chmod(&self, rel: &str, mode: u32) -> io::Result<()>;

    /// Set ownership without following a final symlink.
    fn lchown(&self, rel: &str, uid: u32, gid: u32) -> io::Result<()>;

    /// Set access and modification times without following a final symlink.
    fn set_times(&self, rel: &str, atime: u32, mtime: u32) -> io::Result<()>;
}

// ── Local destination ───────────────────────────────────────────────────────

/// [`HostFs`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalHost {
    root: PathBuf,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

impl HostFs for LocalHost {
    type File = fs::File;

    fn create_dir(&self, rel: &str, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new().mode(mode).create(self.full(rel))
    }

    fn create_file(&self, rel: &str, mode: u32) -> io::Result<Self::File> {
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(self.full(rel))
    }

    fn symlink(&self, target: &str, rel: &str) -> io::Result<()> {
        std::os::unix::fs::symlink(target, self.full(rel))
    }

    fn hardlink(&self, existing: &str, rel: &str) -> io::Result<()> {
        fs::hard_link(self.full(existing), self.full(rel))
    }

    fn mknod(&self, rel: &str, mode: u32, rdev: u64) -> io::Result<()> {
        let path = c_path(&self.full(rel))?;
        let ret = unsafe { libc::mknod(path.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn chmod(&self, rel: &str, mode: u32) -> io::Result<()> {
        fs::set_permissions(self.full(rel), fs::Permissions::from_mode(mode))
    }

    fn lchown(&self, rel: &str, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::lchown(self.full(rel), Some(uid), Some(gid))
    }

    fn set_times(&self, rel: &str, atime: u32, mtime: u32) -> io::Result<()> {
        let path = c_path(&self.full(rel))?;
        let times = [
            libc::timespec {
                tv_sec: atime as libc::time_t,
                tv_nsec: 0,
            },
            libc::timespec {
                tv_sec: mtime as libc::time_t,
                tv_nsec: 0,
            },
        ];
        let ret = unsafe {
            libc::utimensat(
                libc::AT_FDCWD,
                path.as_ptr(),
                times.as_ptr(),
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

// ── Discarding destination ──────────────────────────────────────────────────

/// [`HostFs`] that accepts every operation and writes nothing. Backs listing
/// runs, where the chunk stream is still validated end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostFs for NullHost {
    type File = io::Sink;

    fn create_dir(&self, _rel: &str, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    fn create_file(&self, _rel: &str, _mode: u32) -> io::Result<Self::File> {
        Ok(io::sink())
    }

    fn symlink(&self, _target: &str, _rel: &str) -> io::Result<()> {
        Ok(())
    }

    fn hardlink(&self, _existing: &str, _rel: &str) -> io::Result<()> {
        Ok(())
    }

    fn mknod(&self, _rel: &str, _mode: u32, _rdev: u64) -> io::Result<()> {
        Ok(())
    }

    fn chmod(&self, _rel: &str, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    fn lchown(&self, _rel: &str, _uid: u32, _gid: u32) -> io::Result<()> {
        Ok(())
    }

    fn set_times(&self, _rel: &str, _atime: u32, _mtime: u32) -> io::Result<()> {
        Ok(())
    }
}

// ── Process helpers ─────────────────────────────────────────────────────────

/// Clear the process umask so created nodes get exactly the image's
/// permission bits.
pub fn clear_umask() {
    unsafe {
        libc::umask(0);
    }
}

/// Whether a failed `mknod` was refused by the host (unprivileged caller or
/// unsupported node type) rather than hitting a real I/O fault.
#[must_use]
pub fn mknod_refused(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EINVAL))
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
}
