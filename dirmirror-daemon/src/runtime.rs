use tokio_util::sync::CancellationToken;

use dirmirror_core::SyncSettings;
use dirmirror_sync::{PassReport, Reconciler};

use crate::error::{io_err, DaemonError};
use crate::logging::init_logging;
use crate::scheduler::Scheduler;

/// Start the periodic sync and block the current thread until interrupted.
pub fn start_blocking(settings: SyncSettings) -> Result<(), DaemonError> {
    init_logging(settings.log_file.as_deref())?;
    build_runtime()?.block_on(run(settings))
}

/// Run a single pass on a fresh runtime and return its report.
pub fn run_once(settings: SyncSettings) -> Result<PassReport, DaemonError> {
    init_logging(settings.log_file.as_deref())?;
    build_runtime()?.block_on(async move {
        let cancel = CancellationToken::new();
        let signals = tokio::spawn(shutdown_signal(cancel.clone()));
        let report = Reconciler::new(&settings).run_pass(&cancel).await;
        signals.abort();
        Ok(report)
    })
}

/// Periodic sync loop until SIGINT or SIGTERM.
pub async fn run(settings: SyncSettings) -> Result<(), DaemonError> {
    let cancel = CancellationToken::new();
    let signals = tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!(
        source = %settings.roots.source.display(),
        replica = %settings.roots.replica.display(),
        interval_secs = settings.interval.as_secs(),
        compare = %settings.compare,
        directories = %settings.directories,
        concurrency = settings.concurrency,
        "starting periodic sync"
    );

    let scheduler = Scheduler::new(Reconciler::new(&settings), settings.interval);
    let result = scheduler.run(cancel).await;
    signals.abort();
    result
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

/// Cancel `cancel` on the first ctrl-c or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::debug!("received ctrl-c"),
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::debug!("received SIGTERM");
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    cancel.cancel();
}
