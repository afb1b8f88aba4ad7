//! archivist: back up declared files and directory trees into tar or zip
//! archives.
//!
//! The crate is organised leaves first: [`fs`] wraps the disk, [`walk`]
//! enumerates trees, [`archive`] encodes entries, and [`runner`] ties them
//! together for one [`job::BackupJob`] at a time.

use std::sync::Arc;

pub mod archive;
pub mod error;
pub mod fs;
pub mod job;
pub mod path_util;
pub mod report;
pub mod runner;
pub mod sysexits;
pub mod walk;

use crate::fs::{FileSystem, LocalFs};
use crate::report::{Reporter, TracingReporter};

/// Collaborators shared by the walker's caller, the archive writers and the
/// runner.
#[derive(Clone)]
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub log: Arc<dyn Reporter>,
}

impl Context {
    pub fn new(fs: Arc<dyn FileSystem>, log: Arc<dyn Reporter>) -> Self {
        Self { fs, log }
    }

    /// The local disk, reporting through `tracing`.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFs), Arc::new(TracingReporter))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
