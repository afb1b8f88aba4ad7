//! Translation of filesystem metadata into per-format header records.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tar::{EntryType, Header};
use time::{OffsetDateTime, UtcOffset};
use zip::CompressionMethod;
use zip::write::FullFileOptions;

use super::{ArchiveFormat, Source, format_name};
use crate::Context;
use crate::error::ArchiveError;
use crate::fs::{EntryKind, EntryMeta};

/// Info-ZIP extended timestamp extra field.
const EXTENDED_TIMESTAMP: u16 = 0x5455;

/// Returns `name` with exactly one trailing `/`.
pub fn directory_name(name: &Path) -> PathBuf {
    if let Some(text) = name.to_str() {
        return PathBuf::from(format!("{}/", text.trim_end_matches('/')));
    }
    let mut dir = OsString::from(name.as_os_str());
    if !dir.as_encoded_bytes().ends_with(b"/") {
        dir.push("/");
    }
    PathBuf::from(dir)
}

/// Header and entry name for one tar member.
#[derive(Debug)]
pub struct TarHeader {
    pub header: Header,
    /// Stored byte for byte, whether or not it is UTF-8.
    pub name: PathBuf,
    /// Target recorded for symlinks; `None` when it could not be read.
    pub link_target: Option<PathBuf>,
}

/// Builds the tar header for `source`, stored as `name`.
///
/// The symlink target is read from the source path, never from `name`.
/// Failing to read it only warns and the header is still produced.
///
/// # Errors
/// [`ArchiveError::Header`] for file types tar members cannot represent here.
pub fn tar_header(
    ctx: &Context,
    archive: &Path,
    source: Source<'_>,
    name: &Path,
) -> Result<TarHeader, ArchiveError> {
    let meta = source.meta;
    let entry_type = match meta.kind {
        EntryKind::File => EntryType::Regular,
        EntryKind::Dir => EntryType::Directory,
        EntryKind::Symlink => EntryType::Symlink,
        EntryKind::Other => return Err(unsupported(archive, source, name)),
    };

    let link_target = match meta.kind {
        EntryKind::Symlink => read_link_target(ctx, source.path),
        _ => None,
    };

    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(meta.mode);
    header.set_mtime(meta.mtime_secs());
    header.set_size(if meta.kind == EntryKind::File { meta.len } else { 0 });
    if let Some(uid) = meta.uid {
        header.set_uid(uid);
    }
    if let Some(gid) = meta.gid {
        header.set_gid(gid);
    }
    set_owner_names(&mut header, meta);

    let name = match meta.kind {
        EntryKind::Dir => directory_name(name),
        _ => name.to_path_buf(),
    };
    Ok(TarHeader {
        header,
        name,
        link_target,
    })
}

/// Fills in user and group names for ids that resolve on this host.
#[cfg(unix)]
fn set_owner_names(header: &mut Header, meta: &EntryMeta) {
    let user = meta
        .uid
        .and_then(|uid| u32::try_from(uid).ok())
        .and_then(uzers::get_user_by_uid);
    if let Some(name) = user.as_ref().and_then(|u| u.name().to_str()) {
        // Names longer than the 32-byte field are left out.
        let _ = header.set_username(name);
    }
    let group = meta
        .gid
        .and_then(|gid| u32::try_from(gid).ok())
        .and_then(uzers::get_group_by_gid);
    if let Some(name) = group.as_ref().and_then(|g| g.name().to_str()) {
        let _ = header.set_groupname(name);
    }
}

#[cfg(not(unix))]
fn set_owner_names(_header: &mut Header, _meta: &EntryMeta) {}

/// Options and entry name for one zip member.
#[derive(Debug, Clone)]
pub struct ZipHeader {
    pub name: String,
    pub kind: EntryKind,
    pub options: FullFileOptions<'static>,
    /// Target recorded for symlinks; `None` when it could not be read.
    pub link_target: Option<String>,
}

/// Builds the zip header for `source`, stored as `name`.
///
/// Besides the DOS timestamp the member carries an extended timestamp with
/// the exact modification time in UTC.
///
/// # Errors
/// [`ArchiveError::Header`] for file types zip members cannot represent
/// here, and for names or link targets that are not valid UTF-8.
pub fn zip_header(
    ctx: &Context,
    archive: &Path,
    source: Source<'_>,
    name: &Path,
) -> Result<ZipHeader, ArchiveError> {
    let meta = source.meta;
    if meta.kind == EntryKind::Other {
        return Err(unsupported(archive, source, name));
    }
    let name = match meta.kind {
        EntryKind::Dir => directory_name(name),
        _ => name.to_path_buf(),
    };
    let text = utf8(archive, &name, &name, "entry name")?.to_string();

    let mut options = FullFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip_timestamp(meta.modified))
        .unix_permissions(meta.mode)
        .large_file(meta.len >= u64::from(u32::MAX));
    options
        .add_extra_data(EXTENDED_TIMESTAMP, extended_timestamp(meta), false)
        .map_err(|e| ArchiveError::Header {
            entry: format_name(archive, &name),
            reason: e.to_string(),
        })?;

    let link_target = match meta.kind {
        EntryKind::Symlink => match read_link_target(ctx, source.path) {
            Some(target) => Some(utf8(archive, &name, &target, "link target")?.to_string()),
            None => None,
        },
        _ => None,
    };
    Ok(ZipHeader {
        name: text,
        kind: meta.kind,
        options,
        link_target,
    })
}

/// Builds the header `format` would write for `source` and drops it, so a
/// dry run meets the same warnings and errors as a real one.
///
/// # Errors
/// Whatever [`tar_header`] or [`zip_header`] report.
pub fn inspect(
    ctx: &Context,
    format: ArchiveFormat,
    archive: &Path,
    source: Source<'_>,
    name: &Path,
) -> Result<(), ArchiveError> {
    match format {
        ArchiveFormat::Tar => tar_header(ctx, archive, source, name).map(drop),
        ArchiveFormat::Zip => zip_header(ctx, archive, source, name).map(drop),
    }
}

fn read_link_target(ctx: &Context, path: &Path) -> Option<PathBuf> {
    match ctx.fs.read_link(path) {
        Ok(target) => Some(target),
        Err(e) => {
            ctx.log.warning(format_args!("ReadLink {}: {e}", path.display()));
            None
        }
    }
}

fn unsupported(archive: &Path, source: Source<'_>, name: &Path) -> ArchiveError {
    ArchiveError::Header {
        entry: format_name(archive, name),
        reason: format!("unsupported file type at {}", source.path.display()),
    }
}

/// Zip stores names and link targets as UTF-8 only.
fn utf8<'p>(
    archive: &Path,
    name: &Path,
    value: &'p Path,
    what: &str,
) -> Result<&'p str, ArchiveError> {
    value.to_str().ok_or_else(|| ArchiveError::Header {
        entry: format_name(archive, name),
        reason: format!("{what} is not valid UTF-8 and cannot be stored in zip"),
    })
}

/// Flags byte (modification time present) followed by the mtime in seconds.
fn extended_timestamp(meta: &EntryMeta) -> [u8; 5] {
    let secs = u32::try_from(meta.mtime_secs()).unwrap_or(u32::MAX);
    let mut field = [1, 0, 0, 0, 0];
    field[1..].copy_from_slice(&secs.to_le_bytes());
    field
}

/// Zip stores local time with two-second resolution from 1980 onwards;
/// anything outside that range becomes the format's epoch. UTC stands in
/// when the local offset cannot be determined.
fn zip_timestamp(modified: SystemTime) -> zip::DateTime {
    let secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let Ok(secs) = i64::try_from(secs) else {
        return zip::DateTime::default();
    };
    let Ok(utc) = OffsetDateTime::from_unix_timestamp(secs) else {
        return zip::DateTime::default();
    };
    let offset = UtcOffset::local_offset_at(utc).unwrap_or(UtcOffset::UTC);
    let t = utc.checked_to_offset(offset).unwrap_or(utc);
    let Ok(year) = u16::try_from(t.year()) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        year,
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
    )
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Level, MemoryReporter};
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    fn meta(kind: EntryKind, len: u64) -> EntryMeta {
        EntryMeta {
            kind,
            len,
            modified: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            mode: 0o640,
            uid: Some(1000),
            gid: Some(100),
        }
    }

    fn context() -> (Context, Arc<MemoryReporter>) {
        let log = Arc::new(MemoryReporter::new());
        (Context::new(Arc::new(crate::fs::LocalFs), log.clone()), log)
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(directory_name(Path::new("src")), Path::new("src/"));
        assert_eq!(directory_name(Path::new("src/")), Path::new("src/"));
        assert_eq!(directory_name(Path::new("src/sub//")), Path::new("src/sub/"));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_name_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = Path::new(OsStr::from_bytes(b"src/d\xff"));
        let dir = directory_name(name);
        assert_eq!(dir.as_os_str().as_bytes(), b"src/d\xff/");
    }

    #[test]
    fn test_tar_header_file() {
        let (ctx, _) = context();
        let m = meta(EntryKind::File, 5);
        let source = Source::new(Path::new("/tmp/src/a.txt"), &m);
        let hdr = tar_header(&ctx, Path::new("out.tar"), source, Path::new("src/a.txt")).unwrap();
        assert_eq!(hdr.name, Path::new("src/a.txt"));
        assert_eq!(hdr.header.entry_type(), EntryType::Regular);
        assert_eq!(hdr.header.size().unwrap(), 5);
        assert_eq!(hdr.header.mode().unwrap(), 0o640);
        assert_eq!(hdr.header.mtime().unwrap(), 1_700_000_000);
        assert_eq!(hdr.header.uid().unwrap(), 1000);
        assert_eq!(hdr.header.gid().unwrap(), 100);
        assert!(hdr.link_target.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tar_header_owner_names() {
        let (ctx, _) = context();
        let mut m = meta(EntryKind::File, 0);
        m.uid = Some(0);
        m.gid = Some(0);
        let source = Source::new(Path::new("/tmp/src/a.txt"), &m);
        let hdr = tar_header(&ctx, Path::new("out.tar"), source, Path::new("src/a.txt")).unwrap();
        assert_eq!(hdr.header.username().unwrap(), Some("root"));
        assert_eq!(hdr.header.groupname().unwrap(), Some("root"));
    }

    #[test]
    fn test_tar_header_directory_gets_slash() {
        let (ctx, _) = context();
        let m = meta(EntryKind::Dir, 0);
        let source = Source::new(Path::new("/tmp/src/sub"), &m);
        let hdr = tar_header(&ctx, Path::new("out.tar"), source, Path::new("src/sub")).unwrap();
        assert_eq!(hdr.name, Path::new("src/sub/"));
        assert_eq!(hdr.header.entry_type(), EntryType::Directory);
        assert_eq!(hdr.header.size().unwrap(), 0);
    }

    #[test]
    fn test_tar_header_unreadable_link_warns() {
        let (ctx, log) = context();
        let m = meta(EntryKind::Symlink, 0);
        let source = Source::new(Path::new("/definitely/not/here"), &m);
        let hdr = tar_header(&ctx, Path::new("out.tar"), source, Path::new("src/link")).unwrap();
        assert_eq!(hdr.header.entry_type(), EntryType::Symlink);
        assert!(hdr.link_target.is_none());
        let warnings = log.messages(Level::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("/definitely/not/here"));
    }

    #[test]
    fn test_unsupported_type_is_header_error() {
        let (ctx, _) = context();
        let m = meta(EntryKind::Other, 0);
        let source = Source::new(Path::new("/tmp/src/fifo"), &m);
        let name = Path::new("src/fifo");
        let err = tar_header(&ctx, Path::new("out.tar"), source, name).unwrap_err();
        assert!(matches!(err, ArchiveError::Header { ref entry, .. } if entry == "out.tar:src/fifo"));
        let err = zip_header(&ctx, Path::new("out.zip"), source, name).unwrap_err();
        assert!(matches!(err, ArchiveError::Header { .. }));
        for format in [ArchiveFormat::Tar, ArchiveFormat::Zip] {
            let err = inspect(&ctx, format, Path::new("out"), source, name).unwrap_err();
            assert!(matches!(err, ArchiveError::Header { .. }));
        }
    }

    #[test]
    fn test_zip_header_directory_gets_slash() {
        let (ctx, _) = context();
        let m = meta(EntryKind::Dir, 0);
        let source = Source::new(Path::new("/tmp/src"), &m);
        let hdr = zip_header(&ctx, Path::new("out.zip"), source, Path::new("src")).unwrap();
        assert_eq!(hdr.name, "src/");
        assert_eq!(hdr.kind, EntryKind::Dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_rejects_non_utf8_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (ctx, _) = context();
        let m = meta(EntryKind::File, 1);
        let name = Path::new(OsStr::from_bytes(b"src/a\xff"));
        let source = Source::new(Path::new("/tmp/src/a"), &m);
        let err = zip_header(&ctx, Path::new("out.zip"), source, name).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Header { ref reason, .. } if reason.contains("UTF-8")
        ));
        // Tar keeps the bytes.
        let hdr = tar_header(&ctx, Path::new("out.tar"), source, name).unwrap();
        assert_eq!(hdr.name, name);
    }

    #[test]
    fn test_extended_timestamp() {
        let m = meta(EntryKind::File, 0);
        let field = extended_timestamp(&m);
        assert_eq!(field[0], 1);
        assert_eq!(u32::from_le_bytes([field[1], field[2], field[3], field[4]]), 1_700_000_000);
    }

    #[test]
    fn test_zip_timestamp() {
        let ts = zip_timestamp(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(ts.year(), 2023);
        assert_eq!(ts.month(), 11);
        assert!((14..=15).contains(&ts.day()));
        assert_eq!(zip_timestamp(UNIX_EPOCH), zip::DateTime::default());
    }
}
