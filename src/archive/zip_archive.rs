use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::result::ZipError;

use super::header::{self, ZipHeader};
use super::{ArchiveWriter, Source, copy_data, format_name, open_output};
use crate::Context;
use crate::error::ArchiveError;
use crate::fs::EntryKind;

/// Zip archive written to a local file. Members are deflated.
pub struct ZipArchive {
    path: PathBuf,
    writer: ZipWriter<BufWriter<File>>,
    ctx: Context,
}

impl ZipArchive {
    /// Creates a new zip archive at `path`.
    pub fn create(path: &Path, ctx: Context) -> Result<Self, ArchiveError> {
        let (path, file) = open_output(path)?;
        let writer = ZipWriter::new(BufWriter::new(file));
        Ok(Self { path, writer, ctx })
    }

    fn write_error(&self, name: &str, err: ZipError) -> ArchiveError {
        ArchiveError::Write {
            entry: format_name(&self.path, Path::new(name)),
            source: std::io::Error::other(err),
        }
    }

    fn write_directory(&mut self, hdr: &ZipHeader) -> Result<(), ArchiveError> {
        self.ctx.log.verbose(format_args!("+ {}", hdr.name));
        // Directory members carry no body, so there is no writer to keep.
        self.writer
            .add_directory(hdr.name.as_str(), hdr.options.clone())
            .map_err(|e| self.write_error(&hdr.name, e))
    }
}

impl ArchiveWriter for ZipArchive {
    fn name(&self) -> &Path {
        &self.path
    }

    fn add_file(
        &mut self,
        source: Source<'_>,
        name: &Path,
        content: &mut dyn Read,
    ) -> Result<u64, ArchiveError> {
        self.ctx.log.verbose(format_args!(
            "add_file: source {:?} name {:?}",
            source.path, name
        ));
        let hdr = header::zip_header(&self.ctx, &self.path, source, name)?;
        match hdr.kind {
            EntryKind::Dir => {
                self.write_directory(&hdr)?;
                Ok(0)
            }
            EntryKind::Symlink => {
                let target = hdr.link_target.clone().unwrap_or_default();
                self.ctx.log.verbose(format_args!("+ {} ({target})", hdr.name));
                self.writer
                    .add_symlink(hdr.name.as_str(), target, hdr.options.clone())
                    .map_err(|e| self.write_error(&hdr.name, e))?;
                Ok(0)
            }
            _ => {
                self.ctx.log.verbose(format_args!("+ {}", hdr.name));
                self.writer
                    .start_file(hdr.name.as_str(), hdr.options.clone())
                    .map_err(|e| self.write_error(&hdr.name, e))?;
                let destination = format_name(&self.path, Path::new(&hdr.name));
                copy_data(&mut self.writer, &destination, content, source.path)
            }
        }
    }

    fn add_directory(&mut self, source: Source<'_>, name: &Path) -> Result<(), ArchiveError> {
        self.ctx.log.verbose(format_args!(
            "add_directory: source {:?} name {:?}",
            source.path, name
        ));
        // A directory member needs the slash even if the source is not a
        // directory any more.
        let hdr = header::zip_header(&self.ctx, &self.path, source, &header::directory_name(name))?;
        self.write_directory(&hdr)
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        self.writer
            .flush()
            .map_err(|source| ArchiveError::Write {
                entry: self.path.display().to_string(),
                source,
            })
    }

    fn close(self) -> Result<(), ArchiveError> {
        let path = self.path.clone();
        let close_error = |source| ArchiveError::Close {
            path: path.clone(),
            source,
        };
        let writer = self
            .writer
            .finish()
            .map_err(|e| close_error(std::io::Error::other(e)))?;
        let file = writer
            .into_inner()
            .map_err(|e| close_error(e.into_error()))?;
        file.sync_all().map_err(close_error)
    }
}
