//! Fixed-cadence pass scheduling with drift correction.
//!
//! Pass starts are spaced `interval` apart measured start-to-start: after a
//! pass that took `elapsed`, the scheduler sleeps `interval - elapsed`. A pass
//! that overruns the interval is followed immediately by the next one; passes
//! never overlap.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dirmirror_sync::{PassReport, Reconciler};

use crate::error::DaemonError;

/// One reconciliation pass, as seen by the scheduling loop.
pub trait PassRunner: Send + Sync {
    /// Short human label, e.g. `"/data/src to /backup/replica"`.
    fn describe(&self) -> String;

    fn run_pass(&self, cancel: &CancellationToken) -> impl Future<Output = PassReport> + Send;
}

impl PassRunner for Reconciler {
    fn describe(&self) -> String {
        format!(
            "{} to {}",
            self.roots().source.display(),
            self.roots().replica.display()
        )
    }

    fn run_pass(&self, cancel: &CancellationToken) -> impl Future<Output = PassReport> + Send {
        Reconciler::run_pass(self, cancel)
    }
}

/// How long to wait before the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPlan {
    pub wait: Duration,
    /// The pass took longer than the interval.
    pub overrun: bool,
}

/// `max(0, interval - elapsed)`.
pub fn plan_wait(interval: Duration, elapsed: Duration) -> WaitPlan {
    WaitPlan {
        wait: interval.saturating_sub(elapsed),
        overrun: elapsed > interval,
    }
}

/// Observable state of a running scheduler.
#[derive(Debug)]
pub struct SyncSession {
    interval: Duration,
    running: AtomicBool,
    passes_completed: AtomicU64,
}

impl SyncSession {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: AtomicBool::new(false),
            passes_completed: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Acquire)
    }
}

pub struct Scheduler<R> {
    runner: R,
    session: Arc<SyncSession>,
}

impl<R: PassRunner> Scheduler<R> {
    pub fn new(runner: R, interval: Duration) -> Self {
        Self {
            runner,
            session: Arc::new(SyncSession::new(interval)),
        }
    }

    pub fn session(&self) -> Arc<SyncSession> {
        self.session.clone()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run passes until `cancel` fires. The first pass starts immediately.
    ///
    /// Cancellation during the wait ends the loop at once; during a pass it
    /// ends the loop once the pass returns. Pass failures never end the loop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), DaemonError> {
        let interval = self.session.interval;
        let label = self.runner.describe();
        self.session.running.store(true, Ordering::Release);

        while !cancel.is_cancelled() {
            let started = Instant::now();
            tracing::info!("syncing {label}...");

            let report = self.runner.run_pass(&cancel).await;
            self.session.passes_completed.fetch_add(1, Ordering::AcqRel);
            log_report(&label, &report);
            if cancel.is_cancelled() {
                break;
            }

            let plan = plan_wait(interval, started.elapsed());
            if plan.overrun {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    interval_secs = interval.as_secs(),
                    "pass took longer than the interval; starting the next one now"
                );
            }
            tracing::info!(
                "synced {label}, next pass in {}s",
                plan.wait.as_secs_f64().round() as u64
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(plan.wait) => {}
            }
        }

        self.session.running.store(false, Ordering::Release);
        tracing::info!("sync process interrupted by user");
        Ok(())
    }
}

fn log_report(label: &str, report: &PassReport) {
    if let Some(reason) = &report.aborted {
        tracing::warn!(reason = %reason, "pass {label} aborted");
        return;
    }
    tracing::debug!(
        copied = report.copied,
        bytes = report.bytes_copied,
        failed = report.failed,
        unchanged = report.unchanged,
        deleted_files = report.deleted_files,
        deleted_dirs = report.deleted_dirs,
        errors = report.errors,
        duration_ms = report.duration_ms as u64,
        "pass complete"
    );
    if report.failed + report.errors > 0 {
        tracing::warn!(
            failed = report.failed,
            errors = report.errors,
            "pass {label} finished with errors; they will be retried next pass"
        );
    }
}
