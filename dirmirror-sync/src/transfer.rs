//! Bounded-concurrency file transfers.
//!
//! Every copy first passes through a [`TransferGate`]: at most `limit`
//! transfers hold a permit at once, the rest wait. A transfer still waiting
//! for admission when the pass is cancelled gives up without touching the
//! replica; an admitted transfer always runs to completion.
//!
//! Bytes are streamed in [`CHUNK_SIZE`] chunks. After the last byte the
//! replica's access and modification times are set from the source metadata
//! captured when the transfer was planned. A failed copy leaves whatever was
//! written in place; the next pass sees the mismatch and retries.

use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use filetime::FileTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::classifier::CHUNK_SIZE;
use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Admission gate
// ---------------------------------------------------------------------------

/// Counting admission control shared by every transfer of an engine.
///
/// Cloning is cheap and every clone shares the same permits and counters.
#[derive(Debug, Clone)]
pub struct TransferGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    stats: Arc<GateStats>,
}

#[derive(Debug, Default)]
struct GateStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held for the duration of one admitted transfer.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<GateStats>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TransferGate {
    /// A gate admitting at most `limit` transfers (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            stats: Arc::new(GateStats::default()),
        }
    }

    /// Wait for a free slot, or return `None` once `cancel` fires.
    pub async fn admit(&self, cancel: &CancellationToken) -> Option<GatePermit> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };
        let now = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak.fetch_max(now, Ordering::AcqRel);
        Some(GatePermit {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Transfers currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::Acquire)
    }

    /// Highest `in_flight` observed since the last [`reset_peak`](Self::reset_peak).
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::Acquire)
    }

    pub fn reset_peak(&self) {
        self.stats
            .peak
            .store(self.stats.in_flight.load(Ordering::Acquire), Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// One planned copy. Times are captured before the copy starts so the replica
/// is stamped with the metadata of the bytes that were actually read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub relative: PathBuf,
    pub size: u64,
    pub accessed: FileTime,
    pub modified: FileTime,
}

impl TransferJob {
    pub fn new(source: PathBuf, replica: PathBuf, relative: PathBuf, meta: &Metadata) -> Self {
        Self {
            source,
            replica,
            relative,
            size: meta.len(),
            accessed: FileTime::from_last_access_time(meta),
            modified: FileTime::from_last_modification_time(meta),
        }
    }
}

/// Result of [`copy_file`].
#[derive(Debug)]
pub enum TransferOutcome {
    Copied { bytes: u64 },
    Failed(SyncError),
    /// Cancelled while waiting for admission; the replica was not touched.
    Cancelled,
}

/// Copy `job.source` over `job.replica` once admitted by `gate`.
///
/// Never returns an error: failures are logged and reported as
/// [`TransferOutcome::Failed`] so the pass can carry on.
pub async fn copy_file(
    gate: &TransferGate,
    job: &TransferJob,
    cancel: &CancellationToken,
) -> TransferOutcome {
    let Some(_permit) = gate.admit(cancel).await else {
        tracing::debug!(relative = %job.relative.display(), "transfer cancelled before admission");
        return TransferOutcome::Cancelled;
    };

    match stream_copy(job).await {
        Ok(bytes) => {
            tracing::info!(
                bytes,
                "copied {} to {}",
                job.source.display(),
                job.replica.display()
            );
            TransferOutcome::Copied { bytes }
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "failed to copy {} to {}",
                job.source.display(),
                job.replica.display()
            );
            TransferOutcome::Failed(err)
        }
    }
}

async fn stream_copy(job: &TransferJob) -> Result<u64, SyncError> {
    if let Some(parent) = job.replica.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }

    let mut src = File::open(&job.source)
        .await
        .map_err(|e| io_err(&job.source, e))?;
    let mut dst = File::create(&job.replica)
        .await
        .map_err(|e| io_err(&job.replica, e))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf).await.map_err(|e| io_err(&job.source, e))?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])
            .await
            .map_err(|e| io_err(&job.replica, e))?;
        total += n as u64;
    }
    // Pending writes must land before the timestamps are set.
    dst.flush().await.map_err(|e| io_err(&job.replica, e))?;
    drop(dst);

    let replica = job.replica.clone();
    let (accessed, modified) = (job.accessed, job.modified);
    tokio::task::spawn_blocking(move || filetime::set_file_times(&replica, accessed, modified))
        .await?
        .map_err(|e| io_err(&job.replica, e))?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn job_for(tmp: &TempDir, name: &str, content: &[u8]) -> TransferJob {
        let source = tmp.path().join("src").join(name);
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, content).unwrap();
        filetime::set_file_mtime(&source, FileTime::from_unix_time(1_650_000_000, 123)).unwrap();
        let meta = fs::metadata(&source).unwrap();
        TransferJob::new(
            source,
            tmp.path().join("dst").join(name),
            PathBuf::from(name),
            &meta,
        )
    }

    #[tokio::test]
    async fn copies_bytes_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let job = job_for(&tmp, "nested/test.txt", b"TEST MESSAGE | DATA FILLER");
        let gate = TransferGate::new(2);

        let outcome = copy_file(&gate, &job, &CancellationToken::new()).await;
        assert!(matches!(outcome, TransferOutcome::Copied { bytes: 26 }), "{outcome:?}");
        assert_eq!(fs::read(&job.replica).unwrap(), b"TEST MESSAGE | DATA FILLER");

        let src_mtime = fs::metadata(&job.source).unwrap().modified().unwrap();
        let dst_mtime = fs::metadata(&job.replica).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
        assert_eq!(gate.in_flight(), 0, "permit must be released");
    }

    #[tokio::test]
    async fn large_file_is_streamed_intact() {
        let tmp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..CHUNK_SIZE * 5 + 3).map(|i| (i % 251) as u8).collect();
        let job = job_for(&tmp, "big.bin", &data);
        let outcome = copy_file(&TransferGate::new(1), &job, &CancellationToken::new()).await;
        assert!(matches!(outcome, TransferOutcome::Copied { .. }));
        assert_eq!(fs::read(&job.replica).unwrap(), data);
    }

    #[tokio::test]
    async fn overwrites_existing_replica() {
        let tmp = TempDir::new().unwrap();
        let job = job_for(&tmp, "a.txt", b"new");
        fs::create_dir_all(job.replica.parent().unwrap()).unwrap();
        fs::write(&job.replica, b"old content that is longer").unwrap();
        copy_file(&TransferGate::new(1), &job, &CancellationToken::new()).await;
        assert_eq!(fs::read(&job.replica).unwrap(), b"new");
    }

    #[tokio::test]
    async fn vanished_source_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let job = job_for(&tmp, "gone.txt", b"x");
        fs::remove_file(&job.source).unwrap();
        let gate = TransferGate::new(1);
        let outcome = copy_file(&gate, &job, &CancellationToken::new()).await;
        assert!(matches!(outcome, TransferOutcome::Failed(SyncError::Io { .. })));
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_admission_leaves_replica_untouched() {
        let tmp = TempDir::new().unwrap();
        let job = job_for(&tmp, "a.txt", b"x");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = copy_file(&TransferGate::new(1), &job, &cancel).await;
        assert!(matches!(outcome, TransferOutcome::Cancelled));
        assert!(!job.replica.exists());
    }

    #[tokio::test]
    async fn cancel_releases_waiters_on_saturated_gate() {
        let gate = TransferGate::new(1);
        let cancel = CancellationToken::new();
        let held = gate.admit(&cancel).await.expect("first permit");

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.admit(&cancel).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let admitted = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter must not deadlock")
            .unwrap();
        assert!(!admitted);
        drop(held);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn peak_tracks_highest_in_flight() {
        let gate = TransferGate::new(3);
        let cancel = CancellationToken::new();
        let a = gate.admit(&cancel).await.unwrap();
        let b = gate.admit(&cancel).await.unwrap();
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(gate.peak(), 2);
        gate.reset_peak();
        assert_eq!(gate.peak(), 0);
        assert_eq!(gate.limit(), 3);
    }
}
