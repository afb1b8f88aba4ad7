use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tar::Builder;

use super::header::{self, TarHeader};
use super::{ArchiveWriter, Metered, Progress, Source, format_name, open_output};
use crate::Context;
use crate::error::ArchiveError;
use crate::fs::EntryKind;

/// Tape archive (GNU tar) written to a local file.
pub struct TarArchive {
    path: PathBuf,
    builder: Builder<BufWriter<File>>,
    ctx: Context,
}

impl TarArchive {
    /// Creates a new tar archive at `path`.
    pub fn create(path: &Path, ctx: Context) -> Result<Self, ArchiveError> {
        let (path, file) = open_output(path)?;
        let builder = Builder::new(BufWriter::new(file));
        Ok(Self { path, builder, ctx })
    }

    fn write_error(&self, name: &Path, source: io::Error) -> ArchiveError {
        ArchiveError::Write {
            entry: format_name(&self.path, name),
            source,
        }
    }

    /// Appends a member with no body: directories and symlinks.
    fn append_empty(&mut self, hdr: &mut TarHeader) -> Result<(), ArchiveError> {
        let result = match hdr.link_target {
            Some(ref target) => self.builder.append_link(&mut hdr.header, &hdr.name, target),
            None => self.builder.append_data(&mut hdr.header, &hdr.name, io::empty()),
        };
        result.map_err(|e| self.write_error(&hdr.name, e))
    }

    fn log_header(&self, hdr: &TarHeader) {
        let link = hdr
            .link_target
            .as_deref()
            .map(|t| t.display().to_string())
            .unwrap_or_default();
        self.ctx.log.verbose(format_args!("+ {} ({link})", hdr.name.display()));
    }
}

impl ArchiveWriter for TarArchive {
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
        let mut hdr = header::tar_header(&self.ctx, &self.path, source, name)?;
        self.log_header(&hdr);
        if source.meta.kind != EntryKind::File {
            self.append_empty(&mut hdr)?;
            return Ok(0);
        }

        let mut progress = Progress::default();
        let reader = Metered::new(content, &mut progress, Some(source.meta.len));
        match self.builder.append_data(&mut hdr.header, &hdr.name, reader) {
            Ok(()) => Ok(progress.copied),
            Err(e) if !progress.started => Err(self.write_error(&hdr.name, e)),
            Err(cause) => Err(ArchiveError::Copy {
                source_name: source.path.display().to_string(),
                destination: format_name(&self.path, &hdr.name),
                copied: progress.copied,
                cause,
            }),
        }
    }

    fn add_directory(&mut self, source: Source<'_>, name: &Path) -> Result<(), ArchiveError> {
        self.ctx.log.verbose(format_args!(
            "add_directory: source {:?} name {:?}",
            source.path, name
        ));
        let mut hdr = header::tar_header(&self.ctx, &self.path, source, name)?;
        // A directory header must carry the slash even if the source is not
        // a directory any more.
        hdr.name = header::directory_name(&hdr.name);
        hdr.header.set_entry_type(tar::EntryType::Directory);
        hdr.header.set_size(0);
        hdr.link_target = None;
        self.log_header(&hdr);
        self.append_empty(&mut hdr)
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        self.builder
            .get_mut()
            .flush()
            .map_err(|source| ArchiveError::Write {
                entry: self.path.display().to_string(),
                source,
            })
    }

    fn close(mut self) -> Result<(), ArchiveError> {
        let path = self.path.clone();
        let close_error = |source| ArchiveError::Close {
            path: path.clone(),
            source,
        };
        self.builder.finish().map_err(close_error)?;
        let writer = self.builder.into_inner().map_err(close_error)?;
        let file = writer
            .into_inner()
            .map_err(|e| close_error(e.into_error()))?;
        file.sync_all().map_err(close_error)
    }
}
