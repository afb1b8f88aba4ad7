//! Levelled diagnostics for the backup core.
//!
//! The library never writes to a global logger directly; callers hand a
//! [`Reporter`] to the components that need one. [`TracingReporter`] routes
//! lines into `tracing`, [`MemoryReporter`] keeps them for inspection.

use std::fmt;
use std::sync::Mutex;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Verbose,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Verbose => "VERBOSE",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Sink for diagnostic lines.
pub trait Reporter: Send + Sync {
    fn emit(&self, level: Level, message: fmt::Arguments<'_>);

    fn verbose(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Verbose, message);
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Info, message);
    }

    fn warning(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Warning, message);
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Error, message);
    }

    fn fatal(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Fatal, message);
    }
}

/// Forwards every line to the `tracing` macros under the `archivist` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn emit(&self, level: Level, message: fmt::Arguments<'_>) {
        match level {
            Level::Verbose => tracing::debug!(target: "archivist", "{message}"),
            Level::Info => tracing::info!(target: "archivist", "{message}"),
            Level::Warning => tracing::warn!(target: "archivist", "{message}"),
            Level::Error => tracing::error!(target: "archivist", "{message}"),
            Level::Fatal => tracing::error!(target: "archivist", fatal = true, "{message}"),
        }
    }
}

/// Records every emitted line in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines, oldest first.
    pub fn lines(&self) -> Vec<(Level, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages recorded at exactly `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, level: Level, message: fmt::Arguments<'_>) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((level, message.to_string()));
    }
}
