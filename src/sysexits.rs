//! exit status codes used by archivist, after BSD `sysexits(3)`.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&apropos=0&sektion=0&manpath=FreeBSD+11.2-stable&arch=default&format=html)

/// value: 64 <br>
/// Bad command line, a `--job` name that no declaration defines, or parallel jobs sharing a destination.
pub const EX_USAGE: i32 = 64;

/// value: 65 <br>
/// A job declaration is not valid JSON, YAML or TOML, or does not describe jobs.
pub const EX_DATAERR: i32 = 65;

/// value: 66 <br>
/// A job declaration file (or standard input) could not be read.
pub const EX_NOINPUT: i32 = 66;

/// value: 70 <br>
/// A job thread panicked.
pub const EX_SOFTWARE: i32 = 70;

/// value: 73 <br>
/// A destination archive could not be created.
pub const EX_CANTCREAT: i32 = 73;

/// value: 74 <br>
/// Writing or closing an archive failed, or a job was cancelled.
pub const EX_IOERR: i32 = 74;
