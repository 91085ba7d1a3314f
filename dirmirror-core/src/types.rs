//! Domain types shared by the engine, the daemon and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Root pair
// ---------------------------------------------------------------------------

/// The two trees kept in one-way agreement. `source` is authoritative and
/// never written; `replica` is owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPair {
    pub source: PathBuf,
    pub replica: PathBuf,
}

impl RootPair {
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
        }
    }

    /// Path of `path` relative to `root`, or `None` when `path` is outside it.
    pub fn relative<'a>(path: &'a Path, root: &Path) -> Option<&'a Path> {
        path.strip_prefix(root).ok()
    }

    /// Replica counterpart of a relative path.
    pub fn replica_path(&self, relative: &Path) -> PathBuf {
        self.replica.join(relative)
    }

    /// Source counterpart of a relative path.
    pub fn source_path(&self, relative: &Path) -> PathBuf {
        self.source.join(relative)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the classifier decides whether a replica file is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompareStrategy {
    /// Size and modification time.
    #[default]
    Metadata,
    /// Whole-file content digest.
    Content,
}

impl fmt::Display for CompareStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareStrategy::Metadata => write!(f, "metadata"),
            CompareStrategy::Content => write!(f, "content"),
        }
    }
}

impl FromStr for CompareStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metadata" => Ok(Self::Metadata),
            "content" => Ok(Self::Content),
            other => Err(format!(
                "unknown compare strategy '{other}'; expected: metadata, content"
            )),
        }
    }
}

/// Whether directories are mirrored explicitly or only created on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryMode {
    /// Create replica directories ahead of files and remove orphaned ones.
    #[default]
    Mirror,
    /// Create parent directories per copied file; never remove directories.
    Lazy,
}

impl fmt::Display for DirectoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryMode::Mirror => write!(f, "mirror"),
            DirectoryMode::Lazy => write!(f, "lazy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// Engine configuration after validation. Constructing one by hand skips the
/// checks in [`crate::config`]; tests do this with temp directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub roots: RootPair,
    pub interval: Duration,
    pub compare: CompareStrategy,
    pub directories: DirectoryMode,
    pub concurrency: usize,
    pub log_file: Option<PathBuf>,
}

impl SyncSettings {
    /// Settings with defaults for everything but the roots and interval.
    pub fn new(roots: RootPair, interval: Duration) -> Self {
        Self {
            roots,
            interval,
            compare: CompareStrategy::default(),
            directories: DirectoryMode::default(),
            concurrency: crate::config::default_concurrency(),
            log_file: None,
        }
    }
}
