//! Archive output: one handle per destination file, tar or zip.
//!
//! The format is chosen once when the handle is created. After that every
//! caller goes through the [`ArchiveWriter`] operations and never needs to
//! know which container it is writing.

pub mod header;
mod tar_archive;
mod zip_archive;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use tar_archive::TarArchive;
pub use zip_archive::ZipArchive;

use crate::Context;
use crate::error::ArchiveError;
use crate::fs::EntryMeta;

/// Supported container formats.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Zip for a `.zip` destination, tar for anything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => ArchiveFormat::Zip,
            _ => ArchiveFormat::Tar,
        }
    }
}

/// A filesystem object about to be stored: where it lives on disk and what
/// it looked like when it was inspected.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub path: &'a Path,
    pub meta: &'a EntryMeta,
}

impl<'a> Source<'a> {
    pub fn new(path: &'a Path, meta: &'a EntryMeta) -> Self {
        Self { path, meta }
    }
}

/// Operations shared by every archive format.
pub trait ArchiveWriter {
    /// Destination path of the archive.
    fn name(&self) -> &Path;

    /// Stores `source` as `name`, streaming its body from `content`.
    ///
    /// Symlinks and directories take no body and `content` is not read.
    /// Returns the number of content bytes written. `name` is stored as
    /// given; a format that cannot represent it fails with
    /// [`ArchiveError::Header`].
    fn add_file(
        &mut self,
        source: Source<'_>,
        name: &Path,
        content: &mut dyn Read,
    ) -> Result<u64, ArchiveError>;

    /// Stores a directory marker for `source` as `name/`.
    fn add_directory(&mut self, source: Source<'_>, name: &Path) -> Result<(), ArchiveError>;

    /// Pushes buffered data to the output file without finishing the archive.
    fn flush(&mut self) -> Result<(), ArchiveError>;

    /// Writes the format trailer and closes the output file.
    ///
    /// Reports the first failure among finishing the trailer, flushing and
    /// syncing the file.
    fn close(self) -> Result<(), ArchiveError>
    where
        Self: Sized;
}

/// An open archive of either format.
///
/// Dropping a handle without calling [`ArchiveWriter::close`] still writes
/// the trailer, but any error doing so is lost.
pub enum Archive {
    Tar(TarArchive),
    Zip(ZipArchive),
}

impl Archive {
    /// Creates (or truncates) `path` and prepares it for `format`.
    ///
    /// # Errors
    /// [`ArchiveError::Open`] if the destination cannot be created.
    pub fn create(path: &Path, format: ArchiveFormat, ctx: &Context) -> Result<Self, ArchiveError> {
        match format {
            ArchiveFormat::Tar => TarArchive::create(path, ctx.clone()).map(Archive::Tar),
            ArchiveFormat::Zip => ZipArchive::create(path, ctx.clone()).map(Archive::Zip),
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        match self {
            Archive::Tar(_) => ArchiveFormat::Tar,
            Archive::Zip(_) => ArchiveFormat::Zip,
        }
    }
}

impl ArchiveWriter for Archive {
    fn name(&self) -> &Path {
        match self {
            Archive::Tar(a) => a.name(),
            Archive::Zip(a) => a.name(),
        }
    }

    fn add_file(
        &mut self,
        source: Source<'_>,
        name: &Path,
        content: &mut dyn Read,
    ) -> Result<u64, ArchiveError> {
        match self {
            Archive::Tar(a) => a.add_file(source, name, content),
            Archive::Zip(a) => a.add_file(source, name, content),
        }
    }

    fn add_directory(&mut self, source: Source<'_>, name: &Path) -> Result<(), ArchiveError> {
        match self {
            Archive::Tar(a) => a.add_directory(source, name),
            Archive::Zip(a) => a.add_directory(source, name),
        }
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        match self {
            Archive::Tar(a) => a.flush(),
            Archive::Zip(a) => a.flush(),
        }
    }

    fn close(self) -> Result<(), ArchiveError> {
        match self {
            Archive::Tar(a) => a.close(),
            Archive::Zip(a) => a.close(),
        }
    }
}

/// `"archive:entry"`, the identifier used in diagnostics for a member.
pub fn format_name(archive: &Path, name: &Path) -> String {
    format!("{}:{}", archive.display(), name.display())
}

/// How far a body copy got.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    /// Set by the first read, i.e. once the header has been written.
    pub started: bool,
    pub copied: u64,
}

/// Counts bytes pulled from `inner`. With a limit it stops after `limit`
/// bytes and treats an earlier end of input as an error.
pub(crate) struct Metered<'a, R> {
    inner: R,
    progress: &'a mut Progress,
    limit: Option<u64>,
}

impl<'a, R: Read> Metered<'a, R> {
    pub fn new(inner: R, progress: &'a mut Progress, limit: Option<u64>) -> Self {
        Self {
            inner,
            progress,
            limit,
        }
    }
}

impl<R: Read> Read for Metered<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.progress.started = true;
        let want = match self.limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.progress.copied);
                if remaining == 0 {
                    return Ok(0);
                }
                buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
            }
            None => buf.len(),
        };
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 && want > 0 {
            if let Some(limit) = self.limit {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "source ended after {} of {limit} bytes",
                        self.progress.copied
                    ),
                ));
            }
        }
        self.progress.copied += n as u64;
        Ok(n)
    }
}

/// Copies all of `src` into `dst`.
///
/// # Errors
/// [`ArchiveError::Copy`] naming both ends and the bytes moved before the
/// failure.
pub(crate) fn copy_data(
    dst: &mut dyn Write,
    destination: &str,
    src: &mut dyn Read,
    source_name: &Path,
) -> Result<u64, ArchiveError> {
    let mut progress = Progress::default();
    let mut reader = Metered::new(src, &mut progress, None);
    match io::copy(&mut reader, dst) {
        Ok(n) => Ok(n),
        Err(cause) => Err(ArchiveError::Copy {
            source_name: source_name.display().to_string(),
            destination: destination.to_string(),
            copied: progress.copied,
            cause,
        }),
    }
}

fn open_output(path: &Path) -> Result<(PathBuf, std::fs::File), ArchiveError> {
    let file = std::fs::File::create(path).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((path.to_path_buf(), file))
}
