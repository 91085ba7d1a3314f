//! Periodic sync runtime: drift-corrected scheduler, signal-driven
//! cancellation, logging setup.

mod error;
pub mod log_rotation;
pub mod logging;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use logging::init_logging;
pub use runtime::{run, run_once, start_blocking};
pub use scheduler::{plan_wait, PassRunner, Scheduler, SyncSession, WaitPlan};
