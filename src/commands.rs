//! Command-line interface for archivist.
//!
//! Parses the options, installs the `tracing` subscriber, loads the job
//! declarations and runs the selected jobs on a tokio runtime.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use archivist::Context;
use archivist::error::{ArchiveError, JobError, JobFileError};
use archivist::job::{self, BackupJob, Syntax};
use archivist::runner::BackupRunner;
use archivist::sysexits;
use clap::{Parser, ValueEnum};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Back up files and directory trees into tar or zip archives.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Job declaration files (JSON or TOML). Reads standard input when none
    /// are given.
    pub files: Vec<PathBuf>,
    /// Produce verbose output.
    #[arg(short, long)]
    pub verbose: bool,
    /// How much to log. Overrides --verbose.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
    /// Also log to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Walk and log everything without creating any archive.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    /// Only run the jobs with these names.
    #[arg(short, long, value_delimiter = ',')]
    pub job: Option<Vec<String>>,
    /// Run jobs concurrently. Every job must write a different archive.
    #[arg(short, long)]
    pub parallel: bool,
}

/// Log levels accepted by --log-level.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose => "debug",
            LogLevel::Debug => "trace",
        }
    }
}

impl Cli {
    fn log_level(&self) -> LogLevel {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level,
            (None, true) => LogLevel::Verbose,
            (None, false) => LogLevel::Info,
        }
    }
}

/// Installs the global `tracing` subscriber: stderr, plus the log file when
/// one was requested. `RUST_LOG` takes precedence over the CLI level.
pub(crate) fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("archivist={}", cli.log_level().directive())))?;
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);
    let file = match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()?;
    Ok(())
}

/// Loads every declaration named on the command line, or standard input.
fn load_declarations(files: &[PathBuf]) -> Result<Vec<BackupJob>, JobFileError> {
    if files.is_empty() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| JobFileError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        return job::parse_jobs(&text, Syntax::Detect);
    }
    let mut jobs = vec![];
    for file in files {
        tracing::debug!(target: "archivist", "Parsing {}", file.display());
        jobs.extend(job::load_jobs(file)?);
    }
    Ok(jobs)
}

/// Keeps the jobs named in `names`, in declaration order.
fn select_jobs(jobs: Vec<BackupJob>, names: &[String]) -> Result<Vec<BackupJob>, String> {
    if let Some(missing) = names.iter().find(|n| !jobs.iter().any(|j| &j.name == *n)) {
        return Err(format!("Job {missing:?} not found."));
    }
    Ok(jobs
        .into_iter()
        .filter(|j| names.contains(&j.name))
        .collect())
}

/// Returns the first destination used by more than one job.
fn duplicate_destination(jobs: &[BackupJob]) -> Option<&PathBuf> {
    let mut seen = HashSet::new();
    jobs.iter().map(|j| &j.path).find(|p| !seen.insert(*p))
}

fn exit_code(err: &JobError) -> i32 {
    match err {
        JobError::Archive(ArchiveError::Open { .. }) => sysexits::EX_CANTCREAT,
        _ => sysexits::EX_IOERR,
    }
}

/// Runs the CLI and returns the process exit status.
pub(crate) fn run(cli: &Cli) -> Result<i32> {
    let jobs = match load_declarations(&cli.files) {
        Ok(jobs) => jobs,
        Err(e @ JobFileError::Io { .. }) => {
            tracing::error!(target: "archivist", "{e}");
            return Ok(sysexits::EX_NOINPUT);
        }
        Err(e) => {
            tracing::error!(target: "archivist", "{e}");
            return Ok(sysexits::EX_DATAERR);
        }
    };
    let jobs = match &cli.job {
        Some(names) => match select_jobs(jobs, names) {
            Ok(jobs) => jobs,
            Err(msg) => {
                tracing::error!(target: "archivist", "{msg}");
                return Ok(sysexits::EX_USAGE);
            }
        },
        None => jobs,
    };
    if jobs.is_empty() {
        tracing::info!(target: "archivist", "No backup jobs declared.");
        return Ok(0);
    }
    if cli.parallel {
        if let Some(path) = duplicate_destination(&jobs) {
            tracing::error!(
                target: "archivist",
                "More than one job writes {}; parallel jobs need distinct archives.",
                path.display()
            );
            return Ok(sysexits::EX_USAGE);
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let runner = Arc::new(
        BackupRunner::new(Context::local())
            .dry_run(cli.dry_run)
            .cancel_flag(cancel.clone()),
    );
    let rt = Builder::new_multi_thread().enable_all().build()?;
    let status = rt.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(target: "archivist", "Interrupted, stopping after the current path.");
                cancel.store(true, Ordering::Relaxed);
            }
        });
        if cli.parallel {
            run_parallel(runner, jobs).await
        } else {
            run_sequential(runner, jobs).await
        }
    });
    Ok(status)
}

/// Runs jobs one after another. A failed job does not stop the batch.
async fn run_sequential(runner: Arc<BackupRunner>, jobs: Vec<BackupJob>) -> i32 {
    let mut status = 0;
    for (i, job) in jobs.into_iter().enumerate() {
        tracing::debug!(target: "archivist", "Running backup {i}: {}", job.name);
        let runner = runner.clone();
        let name = job.name.clone();
        let res = tokio::task::spawn_blocking(move || runner.run(&job)).await;
        status = report(&name, res).unwrap_or(status);
    }
    status
}

/// Runs every job on its own blocking thread, each with its own archive.
async fn run_parallel(runner: Arc<BackupRunner>, jobs: Vec<BackupJob>) -> i32 {
    let mut set = tokio::task::JoinSet::new();
    for job in jobs {
        let runner = runner.clone();
        set.spawn_blocking(move || {
            let res = runner.run(&job);
            (job.name, res)
        });
    }
    let mut status = 0;
    while let Some(res) = set.join_next().await {
        let code = match res {
            Ok((name, res)) => report(&name, Ok(res)),
            Err(e) => report("<unknown>", Err(e)),
        };
        status = code.unwrap_or(status);
    }
    status
}

/// Logs the outcome of one job; returns its exit status if it failed.
fn report(
    name: &str,
    res: Result<Result<archivist::runner::JobSummary, JobError>, tokio::task::JoinError>,
) -> Option<i32> {
    match res {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::error!(target: "archivist", "Backup {name} failed: {e}");
            Some(exit_code(&e))
        }
        Err(e) => {
            tracing::error!(target: "archivist", "Backup {name} failed: {e}");
            Some(sysexits::EX_SOFTWARE)
        }
    }
}
