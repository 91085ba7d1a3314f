//! dirmirror: keep a replica directory an exact copy of a source directory.
//!
//! # Usage
//!
//! ```text
//! dirmirror -s <source> -r <replica> -i <seconds> [-l <logfile>]
//!           [-c <config.yaml>] [--compare metadata|content] [--jobs N]
//!           [--lazy-dirs] [--once [--json]]
//! ```

mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dirmirror_core::{probe_log_file, CompareStrategy, DirectoryMode, MirrorConfig, SyncSettings};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dirmirror",
    version,
    about = "Periodically mirror a source directory into a replica",
    long_about = None,
)]
struct Cli {
    /// Directory to copy from.
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Directory kept identical to the source. Anything not in the source is deleted.
    #[arg(short, long)]
    replica: Option<PathBuf>,

    /// Seconds between the starts of consecutive passes.
    #[arg(short, long, allow_negative_numbers = true)]
    interval: Option<i64>,

    /// Also write the log to this file (rotated at 10 MiB).
    #[arg(short = 'l', long = "logfile")]
    log_file: Option<PathBuf>,

    /// YAML file supplying any of the settings above; flags win.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How to decide whether a file changed.
    #[arg(long, value_name = "metadata|content")]
    compare: Option<CompareStrategy>,

    /// Maximum concurrent file transfers [default: 2 per core].
    #[arg(long)]
    jobs: Option<usize>,

    /// Only create replica directories that hold files, and never delete directories.
    #[arg(long)]
    lazy_dirs: bool,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,

    /// Print the pass report as JSON (with `--once`).
    #[arg(long, requires = "once")]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> MirrorConfig {
        MirrorConfig {
            source: self.source.clone(),
            replica: self.replica.clone(),
            interval_secs: self.interval,
            compare: self.compare,
            directories: self.lazy_dirs.then_some(DirectoryMode::Lazy),
            concurrency: self.jobs,
            log_file: self.log_file.clone(),
        }
    }

    fn settings(&self) -> Result<SyncSettings> {
        let file = match &self.config {
            Some(path) => MirrorConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => MirrorConfig::default(),
        };
        file.merge(self.overrides())
            .validate()
            .context("invalid configuration")
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = cli.settings()?;

    // An unwritable log file is not fatal; the console still gets everything.
    if let Some(path) = settings.log_file.clone() {
        if let Err(err) = probe_log_file(&path) {
            eprintln!("warning: {err}; logging to the console only");
            settings.log_file = None;
        }
    }

    if cli.once {
        let report = dirmirror_daemon::run_once(settings.clone()).context("sync pass failed")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            summary::print_report(&settings, &report);
        }
        if let Some(reason) = &report.aborted {
            anyhow::bail!("pass aborted: {reason}");
        }
        return Ok(());
    }

    dirmirror_daemon::start_blocking(settings).context("sync daemon failed")
}
