//! Backup job declarations.
//!
//! A declaration file lists one or more jobs. JSON and YAML files hold a
//! top-level list of jobs:
//!
//! ```yaml
//! - name: documents
//!   path: ~/backups/documents.tar
//!   format: tar
//!   contents:
//!     - ~/Documents
//!     - ~/notes.txt
//! ```
//!
//! TOML files hold the same jobs as `[[job]]` tables:
//!
//! ```toml
//! [[job]]
//! name = "documents"
//! path = "~/backups/documents.tar"
//! format = "tar"
//! contents = ["~/Documents", "~/notes.txt"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::error::JobFileError;
use crate::path_util::expand_home;

/// One archive to produce and the sources that go into it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    /// Name used in diagnostics.
    pub name: String,
    /// Destination archive path.
    pub path: PathBuf,
    /// Container format; inferred from `path` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArchiveFormat>,
    /// Files and directories to archive, in order.
    #[serde(default)]
    pub contents: Vec<PathBuf>,
}

impl BackupJob {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        format: ArchiveFormat,
        contents: Vec<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format: Some(format),
            contents,
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
            .unwrap_or_else(|| ArchiveFormat::from_path(&self.path))
    }

    /// Expands `~` in the destination and every source path.
    fn expand_paths(mut self) -> Self {
        self.path = expand_home(&self.path);
        self.contents = self.contents.iter().map(|p| expand_home(p)).collect();
        self
    }
}

/// TOML layout: a document of `[[job]]` tables.
#[derive(Serialize, Deserialize, Debug, Default)]
struct JobTable {
    #[serde(default, rename = "job")]
    jobs: Vec<BackupJob>,
}

/// Syntax of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Json,
    Yaml,
    Toml,
    /// Try JSON, then YAML, then TOML.
    Detect,
}

impl Syntax {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Syntax::Json,
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Syntax::Yaml
            }
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Syntax::Toml,
            _ => Syntax::Detect,
        }
    }
}

/// Parses a declaration held in memory.
///
/// # Errors
/// Returns the parser error for the selected syntax, or every parser's
/// error when detection fails.
pub fn parse_jobs(text: &str, syntax: Syntax) -> Result<Vec<BackupJob>, JobFileError> {
    let jobs = match syntax {
        Syntax::Json => serde_json::from_str::<Vec<BackupJob>>(text)?,
        Syntax::Yaml => serde_yaml_ng::from_str::<Vec<BackupJob>>(text)?,
        Syntax::Toml => toml::from_str::<JobTable>(text)?.jobs,
        Syntax::Detect => detect(text)?,
    };
    Ok(jobs.into_iter().map(BackupJob::expand_paths).collect())
}

fn detect(text: &str) -> Result<Vec<BackupJob>, JobFileError> {
    let json = match serde_json::from_str::<Vec<BackupJob>>(text) {
        Ok(jobs) => return Ok(jobs),
        Err(e) => e,
    };
    let yaml = match serde_yaml_ng::from_str::<Vec<BackupJob>>(text) {
        Ok(jobs) => return Ok(jobs),
        Err(e) => e,
    };
    match toml::from_str::<JobTable>(text) {
        Ok(table) => Ok(table.jobs),
        Err(toml) => Err(JobFileError::Unrecognized { json, yaml, toml }),
    }
}

/// Reads and parses the declaration file at `path`.
pub fn load_jobs(path: &Path) -> Result<Vec<BackupJob>, JobFileError> {
    let text = fs::read_to_string(path).map_err(|source| JobFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_jobs(&text, Syntax::from_path(path))
}
