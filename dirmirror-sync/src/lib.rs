//! # dirmirror-sync
//!
//! One-way mirroring engine: walks the source tree, classifies each file
//! against its replica counterpart, copies stale files through a bounded
//! admission gate and removes replica entries that no longer exist in source.
//!
//! Call [`Reconciler::run_pass`] for one full pass; scheduling repeated
//! passes is the daemon's job.

pub mod classifier;
pub mod error;
pub mod reconciler;
pub mod transfer;
pub mod walker;

pub use classifier::{classify, hash_file, needs_copy, StaleReason, Verdict, CHUNK_SIZE};
pub use error::SyncError;
pub use reconciler::{PassReport, Reconciler};
pub use transfer::{copy_file, TransferGate, TransferJob, TransferOutcome};
pub use walker::{
    list_directories, list_files, list_non_directories, walk, EntryKind, WalkEntry,
};
