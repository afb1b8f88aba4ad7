use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of an open archive handle.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("cannot create archive {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot build header for {entry}: {reason}")]
    Header { entry: String, reason: String },

    #[error("write to {entry} failed: {source}")]
    Write {
        entry: String,
        #[source]
        source: io::Error,
    },

    #[error("error: {cause} source: {source_name:?} destination: {destination:?} bytes copied: {copied}")]
    Copy {
        source_name: String,
        destination: String,
        copied: u64,
        #[source]
        cause: io::Error,
    },

    #[error("cannot close archive {path:?}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures while loading a job declaration.
#[derive(Error, Debug)]
pub enum JobFileError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error parsing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error parsing YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("error parsing TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("error parsing JSON: {json}\nerror parsing YAML: {yaml}\nerror parsing TOML: {toml}")]
    Unrecognized {
        json: serde_json::Error,
        yaml: serde_yaml_ng::Error,
        toml: toml::de::Error,
    },
}

/// Why a backup job stopped before finishing.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("job {0:?} was cancelled")]
    Cancelled(String),
}
