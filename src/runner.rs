//! Runs one backup job: stat each declared path, walk directories, and hand
//! every entry to the archive.
//!
//! Problems with a source (missing path, unreadable directory, file that
//! cannot be opened) are logged as warnings and skipped. Anything the
//! archive reports ends the job, after the archive has been closed.

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Context;
use crate::archive::{Archive, ArchiveFormat, ArchiveWriter, Source, header};
use crate::error::{ArchiveError, JobError};
use crate::fs::{EntryKind, EntryMeta};
use crate::job::BackupJob;
use crate::path_util::{archive_name, root_name};
use crate::walk::{TreeWalker, WalkOutcome};

/// What a job put into its archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    /// Sources that were logged and left out.
    pub skipped: u64,
    /// Content bytes written (in a dry run, the sizes that would be read).
    pub bytes: u64,
}

/// Where entries go. A dry run builds every header and opens every file
/// like a real run, but stores nothing.
enum Output<'a> {
    Archive(Archive),
    DryRun {
        path: &'a Path,
        format: ArchiveFormat,
    },
}

impl Output<'_> {
    fn add_file(
        &mut self,
        ctx: &Context,
        source: Source<'_>,
        name: &Path,
        content: &mut dyn Read,
    ) -> Result<u64, ArchiveError> {
        match self {
            Output::Archive(archive) => archive.add_file(source, name, content),
            Output::DryRun { path, format } => {
                header::inspect(ctx, *format, path, source, name)?;
                Ok(match source.meta.kind {
                    EntryKind::File => source.meta.len,
                    _ => 0,
                })
            }
        }
    }

    fn add_directory(
        &mut self,
        ctx: &Context,
        source: Source<'_>,
        name: &Path,
    ) -> Result<(), ArchiveError> {
        match self {
            Output::Archive(archive) => archive.add_directory(source, name),
            Output::DryRun { path, format } => {
                header::inspect(ctx, *format, path, source, &header::directory_name(name))
            }
        }
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        match self {
            Output::Archive(archive) => archive.flush(),
            Output::DryRun { .. } => Ok(()),
        }
    }
}

pub struct BackupRunner {
    ctx: Context,
    dry_run: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl BackupRunner {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            dry_run: false,
            cancel: None,
        }
    }

    /// Walk, inspect and log everything but never create or write the
    /// archive.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Checked before each declared path; once set the job stops.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Executes `job`.
    ///
    /// The archive is closed on every path out of this function. When the
    /// job already failed, a close error is logged instead of replacing the
    /// original error.
    ///
    /// # Errors
    /// Any [`ArchiveError`] from creating, writing or closing the archive,
    /// or [`JobError::Cancelled`].
    pub fn run(&self, job: &BackupJob) -> Result<JobSummary, JobError> {
        let log = &self.ctx.log;
        let mut output = if self.dry_run {
            Output::DryRun {
                path: &job.path,
                format: job.format(),
            }
        } else {
            Output::Archive(Archive::create(&job.path, job.format(), &self.ctx)?)
        };

        log.verbose(format_args!("Archiving contents..."));
        let mut summary = JobSummary::default();
        let result = self.add_contents(job, &mut output, &mut summary);

        if let Output::Archive(archive) = output {
            match (&result, archive.close()) {
                (_, Ok(())) => {}
                (Ok(()), Err(e)) => return Err(e.into()),
                (Err(_), Err(e)) => log.warning(format_args!("{e}")),
            }
        }
        result?;

        log.info(format_args!(
            "Archived {} directories, {} files, {} symlinks ({} bytes, {} skipped) into {}",
            summary.directories,
            summary.files,
            summary.symlinks,
            summary.bytes,
            summary.skipped,
            job.path.display()
        ));
        Ok(summary)
    }

    fn add_contents(
        &self,
        job: &BackupJob,
        output: &mut Output<'_>,
        summary: &mut JobSummary,
    ) -> Result<(), JobError> {
        let log = &self.ctx.log;
        for source in &job.contents {
            if self.cancelled() {
                log.warning(format_args!("Backup {} cancelled", job.name));
                return Err(JobError::Cancelled(job.name.clone()));
            }
            let meta = match self.ctx.fs.stat(source) {
                Ok(meta) => meta,
                Err(e) => {
                    log.warning(format_args!("Skipping {}: {e}", source.display()));
                    summary.skipped += 1;
                    continue;
                }
            };
            log.verbose(format_args!("Inspecting {}", describe(source, &meta)));

            let name = root_name(source);
            let result = if meta.is_dir() {
                log.info(format_args!("Adding directory tree {}", name.display()));
                self.add_tree(source, &name, output, summary)
            } else {
                log.info(format_args!("Adding file {}", name.display()));
                self.add_entry(source, &meta, &name, output, summary)
            };
            if let Err(e) = result {
                log.error(format_args!("Failed to backup {}: {e}", source.display()));
                return Err(e.into());
            }
            output.flush()?;
        }
        Ok(())
    }

    fn add_tree(
        &self,
        root: &Path,
        root_name: &Path,
        output: &mut Output<'_>,
        summary: &mut JobSummary,
    ) -> Result<(), ArchiveError> {
        let log = &self.ctx.log;
        TreeWalker::new(self.ctx.fs.as_ref()).walk(root, |path, meta, err| {
            if let Some(err) = err {
                log.warning(format_args!("Skipping {}: {err}", path.display()));
                summary.skipped += 1;
                return WalkOutcome::SkipSubtree;
            }
            let Some(meta) = meta else {
                return WalkOutcome::Continue;
            };
            log.verbose(format_args!("Inspecting {}", describe(path, meta)));
            let name = archive_name(root_name, root, path);
            match self.add_entry(path, meta, &name, output, summary) {
                Ok(()) => WalkOutcome::Continue,
                Err(e) => WalkOutcome::Abort(e),
            }
        })
    }

    /// Stores one entry. The source file is opened right before its content
    /// is copied and dropped as soon as the copy returns; a dry run opens and
    /// drops it the same way.
    fn add_entry(
        &self,
        path: &Path,
        meta: &EntryMeta,
        name: &Path,
        output: &mut Output<'_>,
        summary: &mut JobSummary,
    ) -> Result<(), ArchiveError> {
        let source = Source::new(path, meta);
        match meta.kind {
            EntryKind::Dir => {
                output.add_directory(&self.ctx, source, name)?;
                summary.directories += 1;
            }
            EntryKind::File => {
                let mut content = match self.ctx.fs.open(path) {
                    Ok(content) => content,
                    Err(e) => {
                        self.ctx
                            .log
                            .warning(format_args!("Skipping {}: {e}", path.display()));
                        summary.skipped += 1;
                        return Ok(());
                    }
                };
                summary.bytes += output.add_file(&self.ctx, source, name, &mut content)?;
                summary.files += 1;
            }
            EntryKind::Symlink | EntryKind::Other => {
                output.add_file(&self.ctx, source, name, &mut io::empty())?;
                if meta.kind == EntryKind::Symlink {
                    summary.symlinks += 1;
                }
            }
        }
        Ok(())
    }
}

fn describe(path: &Path, meta: &EntryMeta) -> String {
    let kind = match meta.kind {
        EntryKind::File => '-',
        EntryKind::Dir => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::Other => '?',
    };
    format!("{kind}{:04o} {} {}", meta.mode, meta.len, path.display())
}
