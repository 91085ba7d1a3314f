//! Change classification: does a source file need copying to the replica?
//!
//! Two strategies, selected once per engine:
//!
//! - [`CompareStrategy::Metadata`]: size and modification time. One `stat`
//!   per side; misses edits that preserve both.
//! - [`CompareStrategy::Content`]: SHA-256 of both files, read in
//!   [`CHUNK_SIZE`] chunks. Reads every byte of both files on every pass.
//!
//! A replica entry that is not a regular file (directory, symlink) where the
//! source has a file is reported as [`Verdict::TypeConflict`]; the reconciler
//! removes it before copying.

use std::fs::{self, File, Metadata};
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use dirmirror_core::CompareStrategy;

use crate::error::{io_err, SyncError};

/// Read/write chunk size shared by hashing and transfers.
pub const CHUNK_SIZE: usize = 8192;

/// Why an existing replica file is out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    Size,
    Modified,
    Content,
}

/// Classification of one source file against its replica counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No replica entry at the relative path.
    Missing,
    /// Replica file exists but differs.
    Stale(StaleReason),
    /// Replica entry exists but is not a regular file.
    TypeConflict,
    /// Replica file matches; nothing to do.
    Current,
}

impl Verdict {
    pub fn needs_copy(self) -> bool {
        !matches!(self, Verdict::Current)
    }
}

/// Classify `source` (whose metadata the caller already captured) against
/// `replica`.
pub fn classify(
    source: &Path,
    source_meta: &Metadata,
    replica: &Path,
    strategy: CompareStrategy,
) -> Result<Verdict, SyncError> {
    let replica_meta = match fs::symlink_metadata(replica) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Verdict::Missing),
        // ENOTDIR: a parent of `replica` is a file, so nothing can exist here.
        Err(_) if has_file_ancestor(replica) => return Ok(Verdict::Missing),
        Err(err) => return Err(io_err(replica, err)),
    };
    if !replica_meta.is_file() {
        return Ok(Verdict::TypeConflict);
    }

    match strategy {
        CompareStrategy::Metadata => {
            if source_meta.len() != replica_meta.len() {
                return Ok(Verdict::Stale(StaleReason::Size));
            }
            let source_mtime = source_meta.modified().map_err(|e| io_err(source, e))?;
            let replica_mtime = replica_meta.modified().map_err(|e| io_err(replica, e))?;
            if source_mtime != replica_mtime {
                return Ok(Verdict::Stale(StaleReason::Modified));
            }
        }
        CompareStrategy::Content => {
            if hash_file(source)? != hash_file(replica)? {
                return Ok(Verdict::Stale(StaleReason::Content));
            }
        }
    }
    Ok(Verdict::Current)
}

fn has_file_ancestor(path: &Path) -> bool {
    for ancestor in path.ancestors().skip(1) {
        match fs::symlink_metadata(ancestor) {
            Ok(meta) => return !meta.is_dir(),
            Err(_) => continue,
        }
    }
    false
}

/// `classify(..).needs_copy()` for callers that only want the answer.
pub fn needs_copy(
    source: &Path,
    source_meta: &Metadata,
    replica: &Path,
    strategy: CompareStrategy,
) -> Result<bool, SyncError> {
    classify(source, source_meta, replica, strategy).map(Verdict::needs_copy)
}

/// SHA-256 of a file's content as lowercase hex.
pub fn hash_file(path: &Path) -> Result<String, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_err(path, err)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn pair(tmp: &TempDir, source: &str, replica: &str) -> (PathBuf, PathBuf) {
        let s = tmp.path().join("source.txt");
        let r = tmp.path().join("replica.txt");
        fs::write(&s, source).unwrap();
        fs::write(&r, replica).unwrap();
        let mtime = FileTime::from_unix_time(1_700_000_000, 0);
        set_file_mtime(&s, mtime).unwrap();
        set_file_mtime(&r, mtime).unwrap();
        (s, r)
    }

    fn verdict(s: &Path, r: &Path, strategy: CompareStrategy) -> Verdict {
        let meta = fs::metadata(s).unwrap();
        classify(s, &meta, r, strategy).unwrap()
    }

    #[test]
    fn missing_replica_needs_copy() {
        let tmp = TempDir::new().unwrap();
        let s = tmp.path().join("a.txt");
        fs::write(&s, "X").unwrap();
        let v = verdict(&s, &tmp.path().join("nope.txt"), CompareStrategy::Metadata);
        assert_eq!(v, Verdict::Missing);
        assert!(v.needs_copy());
    }

    #[test]
    fn identical_metadata_is_current() {
        let tmp = TempDir::new().unwrap();
        let (s, r) = pair(&tmp, "same", "same");
        assert_eq!(verdict(&s, &r, CompareStrategy::Metadata), Verdict::Current);
        assert_eq!(verdict(&s, &r, CompareStrategy::Content), Verdict::Current);
    }

    #[test]
    fn size_difference_is_stale() {
        let tmp = TempDir::new().unwrap();
        let (s, r) = pair(&tmp, "longer", "short");
        assert_eq!(
            verdict(&s, &r, CompareStrategy::Metadata),
            Verdict::Stale(StaleReason::Size)
        );
    }

    #[test]
    fn mtime_difference_is_stale() {
        let tmp = TempDir::new().unwrap();
        let (s, r) = pair(&tmp, "same", "same");
        set_file_mtime(&r, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        assert_eq!(
            verdict(&s, &r, CompareStrategy::Metadata),
            Verdict::Stale(StaleReason::Modified)
        );
    }

    #[test]
    fn metadata_strategy_misses_same_size_same_mtime_edit() {
        let tmp = TempDir::new().unwrap();
        let (s, r) = pair(&tmp, "AAAA", "BBBB");
        assert_eq!(verdict(&s, &r, CompareStrategy::Metadata), Verdict::Current);
        assert_eq!(
            verdict(&s, &r, CompareStrategy::Content),
            Verdict::Stale(StaleReason::Content)
        );
    }

    #[test]
    fn directory_in_replica_is_type_conflict() {
        let tmp = TempDir::new().unwrap();
        let s = tmp.path().join("a.txt");
        fs::write(&s, "X").unwrap();
        let r = tmp.path().join("dir");
        fs::create_dir(&r).unwrap();
        assert_eq!(verdict(&s, &r, CompareStrategy::Metadata), Verdict::TypeConflict);
        assert!(needs_copy(&s, &fs::metadata(&s).unwrap(), &r, CompareStrategy::Content).unwrap());
    }

    #[test]
    fn file_in_place_of_parent_directory_means_missing() {
        let tmp = TempDir::new().unwrap();
        let s = tmp.path().join("a.txt");
        fs::write(&s, "X").unwrap();
        let blocker = tmp.path().join("node");
        fs::write(&blocker, "was a file").unwrap();
        let v = verdict(&s, &blocker.join("deeper/child.txt"), CompareStrategy::Metadata);
        assert_eq!(v, Verdict::Missing);
    }

    #[test]
    fn hash_spans_multiple_chunks() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        let mut data = vec![7u8; CHUNK_SIZE * 3 + 17];
        fs::write(&a, &data).unwrap();
        *data.last_mut().unwrap() = 8;
        fs::write(&b, &data).unwrap();
        let ha = hash_file(&a).unwrap();
        assert_eq!(ha.len(), 64);
        assert_ne!(ha, hash_file(&b).unwrap());
    }

    #[test]
    fn hash_of_empty_file_is_sha256_of_nothing() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("empty");
        fs::write(&p, "").unwrap();
        assert_eq!(
            hash_file(&p).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
