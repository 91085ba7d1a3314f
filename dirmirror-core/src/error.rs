//! Error types for dirmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was given neither on the command line nor in the config file.
    #[error("missing required setting '{0}'")]
    MissingField(&'static str),

    #[error("interval must be a positive integer, got {0}")]
    InvalidInterval(String),

    #[error("interval of {secs}s is too large (maximum {max}s)")]
    IntervalTooLarge { secs: u64, max: u64 },

    #[error("{role} path '{path}' does not exist")]
    PathNotFound { role: &'static str, path: PathBuf },

    #[error("{role} path '{path}' is not a directory")]
    NotADirectory { role: &'static str, path: PathBuf },

    #[error("no read access to {role} path: {path}")]
    NotReadable { role: &'static str, path: PathBuf },

    #[error("no write access to {role} path: {path}")]
    NotWritable { role: &'static str, path: PathBuf },

    /// Source and replica are the same directory or one contains the other.
    #[error("source '{source_root}' and replica '{replica_root}' must not overlap")]
    OverlappingRoots {
        source_root: PathBuf,
        replica_root: PathBuf,
    },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load. Includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
