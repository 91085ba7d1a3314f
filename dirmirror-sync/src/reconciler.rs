//! One full reconciliation pass.
//!
//! ## Pass order
//!
//! 1. Check both roots are directories; otherwise abort without deleting.
//! 2. (`mirror` mode) create replica directories missing from the source
//!    layout, replacing any file sitting where a directory belongs.
//! 3. Classify every source file and copy the stale ones through the
//!    transfer gate. All transfers are joined before moving on.
//! 4. Re-check the source root, then delete replica files with no regular
//!    file counterpart in source.
//! 5. (`mirror` mode) delete replica directories with no source counterpart,
//!    deepest first.
//!
//! Per-entry failures are logged and counted; nothing short of cancellation
//! or a missing root stops a pass early.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use dirmirror_core::{CompareStrategy, DirectoryMode, RootPair, SyncSettings};

use crate::classifier::{classify, Verdict};
use crate::error::{io_err, SyncError};
use crate::transfer::{copy_file, TransferGate, TransferJob, TransferOutcome};
use crate::walker::{list_directories, list_files, list_non_directories};

// ---------------------------------------------------------------------------
// Pass report
// ---------------------------------------------------------------------------

/// What one pass did. Counts only; the log carries the paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub copied: usize,
    pub bytes_copied: u64,
    pub failed: usize,
    pub unchanged: usize,
    /// Transfers abandoned while waiting for admission.
    pub skipped: usize,
    pub created_dirs: usize,
    pub deleted_files: usize,
    pub deleted_dirs: usize,
    /// Enumeration, stat, creation and deletion failures.
    pub errors: usize,
    pub peak_concurrency: usize,
    pub cancelled: bool,
    pub aborted: Option<String>,
    pub duration_ms: u128,
}

impl PassReport {
    /// Anything written to or removed from the replica.
    pub fn changes(&self) -> usize {
        self.copied + self.created_dirs + self.deleted_files + self.deleted_dirs
    }

    /// Completed with no failures of any kind.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors == 0 && !self.cancelled && self.aborted.is_none()
    }
}

/// Count of successes and failures for one blocking phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PhaseCount {
    pub done: usize,
    pub errors: usize,
}

/// Transfers found necessary by the planning phase.
#[derive(Debug, Default)]
pub(crate) struct TransferPlan {
    pub jobs: Vec<TransferJob>,
    pub unchanged: usize,
    pub errors: usize,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Runs passes over a fixed root pair. Holds no state between passes except
/// the transfer gate.
#[derive(Debug, Clone)]
pub struct Reconciler {
    roots: RootPair,
    compare: CompareStrategy,
    directories: DirectoryMode,
    gate: TransferGate,
}

impl Reconciler {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            roots: settings.roots.clone(),
            compare: settings.compare,
            directories: settings.directories,
            gate: TransferGate::new(settings.concurrency),
        }
    }

    pub fn roots(&self) -> &RootPair {
        &self.roots
    }

    pub fn gate(&self) -> &TransferGate {
        &self.gate
    }

    /// Run one pass. Always returns a report; failures are inside it.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> PassReport {
        let started = Instant::now();
        let mut report = PassReport::default();
        self.gate.reset_peak();

        self.run_phases(cancel, &mut report).await;

        report.peak_concurrency = self.gate.peak();
        report.duration_ms = started.elapsed().as_millis();
        report
    }

    async fn run_phases(&self, cancel: &CancellationToken, report: &mut PassReport) {
        if let Err(err) = check_roots(&self.roots) {
            tracing::error!(error = %err, "skipping pass");
            report.aborted = Some(err.to_string());
            return;
        }

        if self.directories == DirectoryMode::Mirror {
            let roots = self.roots.clone();
            match blocking(move || create_missing_dirs(&roots)).await {
                Ok(count) => {
                    report.created_dirs += count.done;
                    report.errors += count.errors;
                }
                Err(err) => {
                    tracing::error!(error = %err, "directory phase failed");
                    report.errors += 1;
                }
            }
        }

        let roots = self.roots.clone();
        let compare = self.compare;
        let plan = match blocking(move || plan_transfers(&roots, compare)).await {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(error = %err, "planning phase failed");
                report.errors += 1;
                TransferPlan::default()
            }
        };
        report.unchanged += plan.unchanged;
        report.errors += plan.errors;

        if cancel.is_cancelled() {
            report.cancelled = true;
            report.skipped += plan.jobs.len();
            return;
        }
        self.execute(plan.jobs, cancel, report).await;
        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }

        // The source may have vanished while files were copying.
        if let Err(err) = check_roots(&self.roots) {
            tracing::error!(error = %err, "skipping deletions");
            report.aborted = Some(err.to_string());
            return;
        }

        let roots = self.roots.clone();
        match blocking(move || remove_orphan_files(&roots)).await {
            Ok(count) => {
                report.deleted_files += count.done;
                report.errors += count.errors;
            }
            Err(err) => {
                tracing::error!(error = %err, "file deletion phase failed");
                report.errors += 1;
            }
        }

        if self.directories == DirectoryMode::Mirror {
            let roots = self.roots.clone();
            match blocking(move || remove_orphan_dirs(&roots)).await {
                Ok(count) => {
                    report.deleted_dirs += count.done;
                    report.errors += count.errors;
                }
                Err(err) => {
                    tracing::error!(error = %err, "directory deletion phase failed");
                    report.errors += 1;
                }
            }
        }
    }

    /// Fan out every transfer and wait for all of them.
    async fn execute(
        &self,
        jobs: Vec<TransferJob>,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) {
        let mut tasks = JoinSet::new();
        for job in jobs {
            let gate = self.gate.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { copy_file(&gate, &job, &cancel).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TransferOutcome::Copied { bytes }) => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                Ok(TransferOutcome::Failed(_)) => report.failed += 1,
                Ok(TransferOutcome::Cancelled) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(error = %err, "transfer task failed");
                    report.failed += 1;
                }
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

// ---------------------------------------------------------------------------
// Phases (blocking)
// ---------------------------------------------------------------------------

pub(crate) fn check_roots(roots: &RootPair) -> Result<(), SyncError> {
    for (role, path) in [("source", &roots.source), ("replica", &roots.replica)] {
        if !is_dir(path) {
            return Err(SyncError::RootUnavailable {
                role,
                path: path.clone(),
            });
        }
    }
    Ok(())
}

fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

pub(crate) fn create_missing_dirs(roots: &RootPair) -> PhaseCount {
    let mut count = PhaseCount::default();
    for entry in list_directories(&roots.source) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(error = %err, "failed to enumerate source directory");
                count.errors += 1;
                continue;
            }
        };
        let target = roots.replica_path(&entry.relative);
        match ensure_dir(&target) {
            Ok(true) => {
                tracing::info!("created directory {}", target.display());
                count.done += 1;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to create directory {}", target.display());
                count.errors += 1;
            }
        }
    }
    count
}

/// Make `target` a directory. Returns whether anything was created.
fn ensure_dir(target: &Path) -> Result<bool, SyncError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => {
            tracing::warn!(
                "replacing non-directory {} with a directory",
                target.display()
            );
            fs::remove_file(target).map_err(|e| io_err(target, e))?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(target, err)),
    }
    fs::create_dir_all(target).map_err(|e| io_err(target, e))?;
    Ok(true)
}

pub(crate) fn plan_transfers(roots: &RootPair, compare: CompareStrategy) -> TransferPlan {
    let mut plan = TransferPlan::default();
    for entry in list_files(&roots.source) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(error = %err, "failed to enumerate source file");
                plan.errors += 1;
                continue;
            }
        };
        // Captured once: classification and the copied timestamps agree.
        let meta = match fs::metadata(&entry.path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "error syncing file {}",
                    entry.path.display()
                );
                plan.errors += 1;
                continue;
            }
        };
        let replica = roots.replica_path(&entry.relative);

        let verdict = match classify(&entry.path, &meta, &replica, compare) {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::error!(error = %err, "error syncing file {}", entry.path.display());
                plan.errors += 1;
                continue;
            }
        };
        match verdict {
            Verdict::Current => {
                plan.unchanged += 1;
                continue;
            }
            Verdict::TypeConflict => {
                if let Err(err) = remove_entry(&replica) {
                    tracing::error!(
                        error = %err,
                        "failed to clear {} for file copy",
                        replica.display()
                    );
                    plan.errors += 1;
                    continue;
                }
                tracing::warn!("replaced non-file {} before copy", replica.display());
            }
            Verdict::Missing => {
                if let Err(err) = clear_file_ancestor(&roots.replica, &entry.relative) {
                    tracing::error!(
                        error = %err,
                        "failed to clear the way for {}",
                        replica.display()
                    );
                    plan.errors += 1;
                    continue;
                }
            }
            Verdict::Stale(_) => {}
        }
        plan.jobs
            .push(TransferJob::new(entry.path, replica, entry.relative, &meta));
    }
    plan
}

/// Remove a file, symlink, or whole directory tree.
fn remove_entry(path: &Path) -> Result<(), SyncError> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| io_err(path, e))
    } else {
        fs::remove_file(path).map_err(|e| io_err(path, e))
    }
}

/// Remove the first non-directory sitting where a parent directory of
/// `relative` belongs, e.g. a replica file `node` that became the source
/// directory `node/`. Returns whether anything was removed.
fn clear_file_ancestor(replica_root: &Path, relative: &Path) -> Result<bool, SyncError> {
    let Some(parent) = relative.parent() else {
        return Ok(false);
    };
    let mut current = replica_root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                remove_entry(&current)?;
                tracing::warn!(
                    "removed {} to make room for a directory",
                    current.display()
                );
                return Ok(true);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(io_err(&current, err)),
        }
    }
    Ok(false)
}

/// What the source holds at a relative path, for deletion decisions.
enum SourceSide {
    Absent,
    File,
    Directory,
    Other,
}

fn source_side(path: &Path) -> Result<SourceSide, SyncError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => Ok(SourceSide::File),
        Ok(meta) if meta.is_dir() => Ok(SourceSide::Directory),
        Ok(_) => Ok(SourceSide::Other),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(SourceSide::Absent),
        Err(err) => Err(io_err(path, err)),
    }
}

pub(crate) fn remove_orphan_files(roots: &RootPair) -> PhaseCount {
    let mut count = PhaseCount::default();
    for entry in list_non_directories(&roots.replica) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(error = %err, "failed to enumerate replica file");
                count.errors += 1;
                continue;
            }
        };
        let source = roots.source_path(&entry.relative);
        match source_side(&source) {
            Ok(SourceSide::File) => continue,
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "cannot stat source for {}", entry.path.display());
                count.errors += 1;
                continue;
            }
        }
        // A vanished source root looks exactly like "every file deleted".
        if !is_dir(&roots.source) {
            tracing::error!(
                "source root {} disappeared; stopping deletions",
                roots.source.display()
            );
            count.errors += 1;
            break;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                tracing::info!(
                    "deleted {} from replica as it was not present in source",
                    entry.path.display()
                );
                count.done += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to delete {}", entry.path.display());
                count.errors += 1;
            }
        }
    }
    count
}

pub(crate) fn remove_orphan_dirs(roots: &RootPair) -> PhaseCount {
    let mut count = PhaseCount::default();
    let mut dirs = Vec::new();
    for entry in list_directories(&roots.replica) {
        match entry {
            Ok(entry) => dirs.push(entry),
            Err(err) => {
                tracing::error!(error = %err, "failed to enumerate replica directory");
                count.errors += 1;
            }
        }
    }
    // Deepest first, so children are gone before their parent is examined.
    dirs.sort_by(|a, b| b.depth.cmp(&a.depth));

    for dir in dirs {
        let source = roots.source_path(&dir.relative);
        match source_side(&source) {
            Ok(SourceSide::Directory) => continue,
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "cannot stat source for {}", dir.path.display());
                count.errors += 1;
                continue;
            }
        }
        if !is_dir(&roots.source) {
            tracing::error!(
                "source root {} disappeared; stopping deletions",
                roots.source.display()
            );
            count.errors += 1;
            break;
        }
        match fs::remove_dir_all(&dir.path) {
            Ok(()) => {
                tracing::info!(
                    "deleted directory {} from replica as it was not present in source",
                    dir.path.display()
                );
                count.done += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to delete directory {}", dir.path.display());
                count.errors += 1;
            }
        }
    }
    count
}
