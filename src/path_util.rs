use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Expands a leading `~` or `$HOME` to the user's home directory.
///
/// Paths that do not start with either, or a missing home directory, are
/// returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(input) = path.to_str() else {
        return path.to_path_buf();
    };
    for prefix in ["~", "$HOME"] {
        let Some(rest) = input.strip_prefix(prefix) else {
            continue;
        };
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
            continue;
        }
        if let Some(home) = dirs::home_dir() {
            let rest = rest.trim_start_matches(['/', '\\']);
            return if rest.is_empty() { home } else { home.join(rest) };
        }
    }
    path.to_path_buf()
}

/// Name under which a declared path is stored at the top of an archive.
///
/// This is the path's last component, byte for byte; for paths without one
/// (`/`, `..`) the canonical form is tried, then `root`.
pub fn root_name(path: &Path) -> PathBuf {
    if let Some(name) = path.file_name() {
        return PathBuf::from(name);
    }
    path.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("root"))
}

/// Archive name of `path`, found while walking `root`: `root_name` followed
/// by the components of `path` below `root`, joined with `/`.
///
/// Components are copied as raw OS strings, so names that are not valid
/// UTF-8 reach the archive writer unchanged.
pub fn archive_name(root_name: &Path, root: &Path, path: &Path) -> PathBuf {
    let mut name = OsString::from(root_name.as_os_str());
    if let Ok(rel) = path.strip_prefix(root) {
        for component in rel.components() {
            if let Component::Normal(part) = component {
                name.push("/");
                name.push(part);
            }
        }
    }
    PathBuf::from(name)
}
