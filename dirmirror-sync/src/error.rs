//! Error types for dirmirror-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from a sync pass.
///
/// None of these abort a pass on their own; the reconciler logs them per
/// entry and moves on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source or replica root is missing or not a directory.
    #[error("{role} root unavailable: {path}")]
    RootUnavailable { role: &'static str, path: PathBuf },

    /// A blocking filesystem task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
