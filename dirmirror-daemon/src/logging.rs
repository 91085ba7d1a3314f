//! Tracing subscriber setup: console on stderr, plus an optional rotated log
//! file. Both sinks share one line format:
//!
//! ```text
//! 19-10-2026 14:03:11  INFO copied /src/a.txt to /replica/a.txt bytes=1
//! ```

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{RotatingFileWriter, MAX_LOG_BYTES, MAX_ROTATED_FILES};

/// `chrono` format of the timestamp that prefixes every line.
pub const LOG_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Local wall-clock timestamps in [`LOG_TIME_FORMAT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format(LOG_TIME_FORMAT))
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter.
///
/// Fails only when `log_file` cannot be opened, or when a subscriber is
/// already installed and the file sink would be silently lost.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), DaemonError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_timer(LocalTimestamp)
        .with_target(false)
        .with_writer(std::io::stderr);

    let file = match log_file {
        Some(path) => {
            let writer = RotatingFileWriter::open(path, MAX_LOG_BYTES, MAX_ROTATED_FILES)
                .map_err(|e| io_err(path, e))?;
            Some(
                fmt::layer()
                    .with_timer(LocalTimestamp)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(writer)),
            )
        }
        None => None,
    };
    let wants_file = file.is_some();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();

    match installed {
        Ok(()) => Ok(()),
        Err(err) if wants_file => Err(DaemonError::Logging(err.to_string())),
        // Console-only callers (tests, repeated setup) keep whatever is installed.
        Err(_) => Ok(()),
    }
}
