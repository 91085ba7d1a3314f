//! Configuration file model, flag merging and validation.
//!
//! # Config file
//!
//! ```yaml
//! source: /srv/data
//! replica: /mnt/backup/data
//! interval_secs: 60
//! compare: metadata      # or: content
//! directories: mirror    # or: lazy
//! concurrency: 8
//! log_file: /var/log/dirmirror.log
//! ```
//!
//! Every key is optional in the file; command-line flags override file values
//! field by field, then [`MirrorConfig::validate`] produces [`SyncSettings`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{CompareStrategy, DirectoryMode, RootPair, SyncSettings};

/// Largest accepted interval. Keeps `Instant + interval` far from overflow.
pub const MAX_INTERVAL_SECS: u64 = u32::MAX as u64;

/// Concurrent transfers per available CPU when no limit is configured.
pub const TASKS_PER_CORE: usize = 2;

/// Unvalidated configuration, as read from a file and/or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    pub source: Option<PathBuf>,
    pub replica: Option<PathBuf>,
    /// Signed so that negative values reach validation instead of failing to parse.
    pub interval_secs: Option<i64>,
    pub compare: Option<CompareStrategy>,
    pub directories: Option<DirectoryMode>,
    pub concurrency: Option<usize>,
    pub log_file: Option<PathBuf>,
}

impl MirrorConfig {
    /// Load a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `overrides` on top of `self`; every `Some` in `overrides` wins.
    pub fn merge(self, overrides: MirrorConfig) -> MirrorConfig {
        MirrorConfig {
            source: overrides.source.or(self.source),
            replica: overrides.replica.or(self.replica),
            interval_secs: overrides.interval_secs.or(self.interval_secs),
            compare: overrides.compare.or(self.compare),
            directories: overrides.directories.or(self.directories),
            concurrency: overrides.concurrency.or(self.concurrency),
            log_file: overrides.log_file.or(self.log_file),
        }
    }

    /// Check every invariant the engine relies on at startup.
    pub fn validate(self) -> Result<SyncSettings, ConfigError> {
        let interval = validate_interval(self.interval_secs)?;
        let source = self.source.ok_or(ConfigError::MissingField("source"))?;
        let replica = self.replica.ok_or(ConfigError::MissingField("replica"))?;

        let source = validate_root(&source, "source")?;
        let replica = validate_root(&replica, "replica")?;
        if source.starts_with(&replica) || replica.starts_with(&source) {
            return Err(ConfigError::OverlappingRoots {
                source_root: source,
                replica_root: replica,
            });
        }

        let concurrency = match self.concurrency {
            Some(0) => return Err(ConfigError::InvalidConcurrency),
            Some(n) => n,
            None => default_concurrency(),
        };

        Ok(SyncSettings {
            roots: RootPair::new(source, replica),
            interval,
            compare: self.compare.unwrap_or_default(),
            directories: self.directories.unwrap_or_default(),
            concurrency,
            log_file: self.log_file,
        })
    }
}

/// `2 × available_parallelism`, or [`TASKS_PER_CORE`] if that is unknown.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * TASKS_PER_CORE)
        .unwrap_or(TASKS_PER_CORE)
}

fn validate_interval(secs: Option<i64>) -> Result<Duration, ConfigError> {
    let secs = secs.ok_or(ConfigError::MissingField("interval"))?;
    if secs <= 0 {
        return Err(ConfigError::InvalidInterval(secs.to_string()));
    }
    let secs = secs as u64;
    if secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::IntervalTooLarge {
            secs,
            max: MAX_INTERVAL_SECS,
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Returns the canonical form of `path` once it is known to be a readable,
/// writable directory.
fn validate_root(path: &Path, role: &'static str) -> Result<PathBuf, ConfigError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::PathNotFound {
                role,
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    if !meta.is_dir() {
        return Err(ConfigError::NotADirectory {
            role,
            path: path.to_path_buf(),
        });
    }
    if fs::read_dir(path).is_err() {
        return Err(ConfigError::NotReadable {
            role,
            path: path.to_path_buf(),
        });
    }
    if !is_writable_dir(path) {
        return Err(ConfigError::NotWritable {
            role,
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|e| io_err(path, e))
}

/// Permission bits say nothing about who owns the directory, so create (and
/// drop) a scratch file in it instead.
fn is_writable_dir(path: &Path) -> bool {
    tempfile::Builder::new()
        .prefix(".dirmirror-probe")
        .tempfile_in(path)
        .is_ok()
}

/// Check that `path` can be opened for appending.
///
/// A failure here is not fatal: callers warn and fall back to console logging.
pub fn probe_log_file(path: &Path) -> Result<(), ConfigError> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| io_err(path, e))
}
