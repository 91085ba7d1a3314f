//! Lazy recursive directory walker.
//!
//! Every call to [`walk`] rescans from the root; no state survives between
//! passes. A missing root yields nothing. Symbolic links and special files are
//! yielded as [`EntryKind::Other`] and never followed; [`list_files`] and
//! [`list_directories`] leave them out. Sibling order is whatever `read_dir`
//! returns.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// Kind of a yielded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlink, socket, fifo or device.
    Other,
}

/// One file or directory found under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    /// Path relative to the walked root; the join key between trees.
    pub relative: PathBuf,
    pub kind: EntryKind,
    /// 1 for direct children of the root.
    pub depth: usize,
}

/// Iterator returned by [`walk`].
pub struct Walk {
    root: PathBuf,
    pending: Vec<(PathBuf, PathBuf, usize)>,
    current: Option<Listing>,
}

struct Listing {
    dir: PathBuf,
    relative: PathBuf,
    depth: usize,
    entries: fs::ReadDir,
}

/// Walk every entry under `root` without following symlinks.
pub fn walk(root: &Path) -> Walk {
    Walk {
        root: root.to_path_buf(),
        pending: vec![(root.to_path_buf(), PathBuf::new(), 0)],
        current: None,
    }
}

/// Regular files under `root`, plus any enumeration errors.
pub fn list_files(root: &Path) -> impl Iterator<Item = Result<WalkEntry, SyncError>> {
    walk(root).filter(|item| match item {
        Ok(entry) => entry.kind == EntryKind::File,
        Err(_) => true,
    })
}

/// Every entry that is not a directory (regular files, symlinks, special
/// files), plus any enumeration errors.
pub fn list_non_directories(root: &Path) -> impl Iterator<Item = Result<WalkEntry, SyncError>> {
    walk(root).filter(|item| match item {
        Ok(entry) => entry.kind != EntryKind::Directory,
        Err(_) => true,
    })
}

/// Directories under `root` (excluding the root itself), plus any enumeration
/// errors. A parent is always yielded before its children.
pub fn list_directories(root: &Path) -> impl Iterator<Item = Result<WalkEntry, SyncError>> {
    walk(root).filter(|item| match item {
        Ok(entry) => entry.kind == EntryKind::Directory,
        Err(_) => true,
    })
}

impl Iterator for Walk {
    type Item = Result<WalkEntry, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(listing) = self.current.as_mut() else {
                let (dir, relative, depth) = self.pending.pop()?;
                match fs::read_dir(&dir) {
                    Ok(entries) => {
                        self.current = Some(Listing {
                            dir,
                            relative,
                            depth,
                            entries,
                        });
                    }
                    // Root not created yet, or a directory removed mid-walk.
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        tracing::debug!(path = %dir.display(), "directory vanished during walk");
                    }
                    Err(err) => return Some(Err(io_err(dir, err))),
                }
                continue;
            };

            let entry = match listing.entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => return Some(Err(io_err(&listing.dir, err))),
                None => {
                    self.current = None;
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Some(Err(io_err(path, err))),
            };
            let relative = listing.relative.join(entry.file_name());
            let depth = listing.depth + 1;

            if file_type.is_dir() {
                self.pending.push((path.clone(), relative.clone(), depth));
                return Some(Ok(WalkEntry {
                    path,
                    relative,
                    kind: EntryKind::Directory,
                    depth,
                }));
            }
            let kind = if file_type.is_file() {
                EntryKind::File
            } else {
                tracing::debug!(
                    root = %self.root.display(),
                    path = %path.display(),
                    "non-regular entry"
                );
                EntryKind::Other
            };
            return Some(Ok(WalkEntry {
                path,
                relative,
                kind,
                depth,
            }));
        }
    }
}
