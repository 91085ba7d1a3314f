//! Size-based rotation for the sync log file.
//!
//! Keeps at most [`MAX_ROTATED_FILES`] rotated copies using the scheme:
//!   sync.log → sync.log.1 → sync.log.2 → … → sync.log.10
//!
//! [`RotatingFileWriter`] rotates before a write would push the live file past
//! the size limit, so a single log line is never split across two files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 10;

/// Rotate `log_path` if its size has reached `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold or does not exist yet.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }
    rotate(log_path, max_files)?;
    Ok(true)
}

/// Shift every backup up by one and move the live log to `.1`, unconditionally.
///
///   `<name>.<max_files>` deleted
///   `<name>.<n>` → `<name>.<n+1>` for n = max_files-1 … 1
///   `<name>` → `<name>.1`
///   fresh empty `<name>` created
///
/// With `max_files == 0` the live log is truncated instead.
pub fn rotate(log_path: &Path, max_files: usize) -> io::Result<()> {
    if max_files > 0 {
        let oldest = numbered_path(log_path, max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..max_files).rev() {
            let src = numbered_path(log_path, n);
            if src.exists() {
                fs::rename(&src, numbered_path(log_path, n + 1))?;
            }
        }
        if log_path.exists() {
            fs::rename(log_path, numbered_path(log_path, 1))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;
    Ok(())
}

/// Path of the `n`-th rotated copy of `base` (e.g. `sync.log.2`).
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("dirmirror.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only log file that rotates itself by size.
#[derive(Debug)]
pub struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    file: File,
    written: u64,
}

impl RotatingFileWriter {
    /// Open (or create) `path` for appending. A leftover file already over the
    /// limit is rotated first.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(&path, max_bytes, max_files)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            max_files,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;
        rotate(&self.path, self.max_files)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // An empty file always takes the write, even one larger than the limit.
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.roll_over()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
