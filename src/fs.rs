//! Filesystem access used while walking and archiving sources.
//!
//! Everything the backup core needs from the disk goes through the
//! [`FileSystem`] trait so tests can substitute failures. [`LocalFs`] is the
//! real implementation over `std::fs`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The type of a filesystem object as seen by the backup core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Fifos, sockets, devices and anything else with no archive mapping.
    Other,
}

/// Metadata of one filesystem object, detached from `std::fs::Metadata` so
/// it can be built by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub kind: EntryKind,
    pub len: u64,
    pub modified: SystemTime,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
}

impl EntryMeta {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Seconds since the unix epoch, clamped to zero for earlier times.
    pub fn mtime_secs(&self) -> u64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl From<fs::Metadata> for EntryMeta {
    fn from(meta: fs::Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        let len = if kind == EntryKind::File { meta.len() } else { 0 };
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let (mode, uid, gid) = ownership(&meta, kind);
        Self {
            kind,
            len,
            modified,
            mode,
            uid,
            gid,
        }
    }
}

#[cfg(unix)]
fn ownership(meta: &fs::Metadata, _kind: EntryKind) -> (u32, Option<u64>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    (
        meta.mode() & 0o7777,
        Some(u64::from(meta.uid())),
        Some(u64::from(meta.gid())),
    )
}

#[cfg(not(unix))]
fn ownership(meta: &fs::Metadata, kind: EntryKind) -> (u32, Option<u64>, Option<u64>) {
    let mode = match (kind, meta.permissions().readonly()) {
        (EntryKind::Dir, _) => 0o755,
        (_, true) => 0o444,
        (_, false) => 0o644,
    };
    (mode, None, None)
}

/// Fallible filesystem operations the backup core depends on.
pub trait FileSystem: Send + Sync {
    /// Metadata of `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<EntryMeta>;
    /// Metadata of `path` itself; symlinks report [`EntryKind::Symlink`].
    fn symlink_metadata(&self, path: &Path) -> io::Result<EntryMeta>;
    /// File names of the immediate children of the directory `path`, in
    /// whatever order the platform returns them.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        fs::metadata(path).map(EntryMeta::from)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        fs::symlink_metadata(path).map(EntryMeta::from)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect()
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }
}
