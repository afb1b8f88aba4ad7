//! Recursive directory walker with visitor-controlled error recovery.
//!
//! [`TreeWalker::walk`] visits the root and then every descendant in
//! depth-first pre-order. Children of a directory are visited in ascending
//! byte order of their file names, so two walks over an unchanged tree see
//! the same sequence. Symlinks are reported as entries and never followed.
//!
//! The visitor receives the path of the entry, its metadata when it could be
//! read, and the error that occurred while inspecting it, if any. Its
//! [`WalkOutcome`] decides what happens next.

use std::io;
use std::path::Path;

use crate::fs::{EntryMeta, FileSystem};

/// The visitor's directive to the walker.
#[derive(Debug)]
pub enum WalkOutcome<E> {
    /// Keep going; descend if the entry is a directory.
    Continue,
    /// Do not descend into this directory. Same as `Continue` for anything
    /// that is not a directory.
    SkipSubtree,
    /// Stop the whole walk and return `E` from [`TreeWalker::walk`].
    Abort(E),
}

pub struct TreeWalker<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> TreeWalker<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Walks the tree rooted at `root`.
    ///
    /// The root is stat'ed following symlinks, so a declared path that is a
    /// link to a directory is walked as that directory. If the stat fails the
    /// visitor is called once with `(root, None, Some(err))`.
    ///
    /// A directory whose children cannot be listed is visited a second time
    /// as `(dir, Some(meta), Some(err))`; only `Abort` changes anything then.
    ///
    /// # Errors
    /// Returns the error carried by the first `WalkOutcome::Abort`.
    pub fn walk<E, F>(&self, root: &Path, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&Path, Option<&EntryMeta>, Option<io::Error>) -> WalkOutcome<E>,
    {
        match self.fs.stat(root) {
            Ok(meta) => self.walk_entry(root, &meta, &mut visit),
            Err(err) => match visit(root, None, Some(err)) {
                WalkOutcome::Abort(e) => Err(e),
                WalkOutcome::Continue | WalkOutcome::SkipSubtree => Ok(()),
            },
        }
    }

    fn walk_entry<E, F>(&self, path: &Path, meta: &EntryMeta, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&Path, Option<&EntryMeta>, Option<io::Error>) -> WalkOutcome<E>,
    {
        match visit(path, Some(meta), None) {
            WalkOutcome::Abort(e) => return Err(e),
            WalkOutcome::SkipSubtree => return Ok(()),
            WalkOutcome::Continue => {}
        }
        if !meta.is_dir() {
            return Ok(());
        }

        let mut names = match self.fs.read_dir(path) {
            Ok(names) => names,
            Err(err) => {
                return match visit(path, Some(meta), Some(err)) {
                    WalkOutcome::Abort(e) => Err(e),
                    WalkOutcome::Continue | WalkOutcome::SkipSubtree => Ok(()),
                };
            }
        };
        names.sort_unstable_by(|a, b| a.as_encoded_bytes().cmp(b.as_encoded_bytes()));

        for name in names {
            let child = path.join(&name);
            match self.fs.symlink_metadata(&child) {
                Ok(child_meta) => self.walk_entry(&child, &child_meta, visit)?,
                Err(err) => {
                    if let WalkOutcome::Abort(e) = visit(&child, None, Some(err)) {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }
}
