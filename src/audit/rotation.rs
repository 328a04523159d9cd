//! Audit log rotation
//!
//! Size-triggered rotation with a numbered suffix scheme:
//!
//! - `blocked.log` - current active log
//! - `blocked.log.1` - most recent rotation
//! - `blocked.log.2` - one before that, and so on
//!
//! After each rotation old files are pruned twice: files beyond the backup
//! count are deleted, and remaining rotated files older than the age limit
//! are deleted. A zero backup count or zero age disables the respective
//! prune.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};

/// Upper bound on the rotated-file scan, a backstop against runaway
/// directories rather than a real limit
const MAX_SCAN: u32 = 1000;

/// Rotation policy for a single log file
///
/// Holds only paths and limits; the sink owns the file handle and byte
/// counter and asks [`should_rotate`](Self::should_rotate) before each
/// write.
#[derive(Debug, Clone)]
pub struct LogRotation {
    /// Path of the active log file
    path: PathBuf,

    /// Rotate before the active file would exceed this many bytes
    max_bytes: u64,

    /// Delete rotated files older than this many days (0 = keep)
    max_age_days: u32,

    /// Keep at most this many rotated files (0 = keep all)
    max_backups: u32,
}

impl LogRotation {
    /// Create a rotation policy
    ///
    /// `max_size_mb` is clamped to at least 1 MB.
    #[must_use]
    pub fn new(path: PathBuf, max_size_mb: u64, max_age_days: u32, max_backups: u32) -> Self {
        Self {
            path,
            max_bytes: max_size_mb.max(1) * 1024 * 1024,
            max_age_days,
            max_backups,
        }
    }

    /// Path of the active log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size threshold in bytes
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Whether writing `incoming` more bytes should trigger a rotation
    ///
    /// An empty active file never rotates, so a single oversized line still
    /// lands somewhere.
    #[must_use]
    pub fn should_rotate(&self, written: u64, incoming: u64) -> bool {
        written > 0 && written + incoming > self.max_bytes
    }

    /// Rotate the active file into the numbered sequence
    ///
    /// Shifts `path.1` to `path.2` and so on, renames the active file to
    /// `path.1`, then prunes by backup count and age. Prune failures are
    /// logged and ignored; only the final rename of the active file is
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the active file cannot be
    /// renamed.
    pub fn rotate(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            debug!("Log file does not exist, skipping rotation");
            return Ok(());
        }

        // First free slot in the numbered sequence
        let mut next = 1;
        while next < MAX_SCAN && self.rotated_path(next).exists() {
            next += 1;
        }

        for i in (1..next).rev() {
            let from = self.rotated_path(i);
            let to = self.rotated_path(i + 1);
            if let Err(e) = fs::rename(&from, &to) {
                warn!("Failed to shift {:?}: {}", from, e);
            }
        }

        let rotated = self.rotated_path(1);
        fs::rename(&self.path, &rotated)?;
        info!("Rotated {:?} to {:?}", self.path, rotated);

        self.prune();
        Ok(())
    }

    /// Path for the N-th rotated file
    fn rotated_path(&self, number: u32) -> PathBuf {
        let mut path = self.path.clone();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("blocked.log");
        path.set_file_name(format!("{file_name}.{number}"));
        path
    }

    /// Delete rotated files beyond the backup count or older than the age
    /// limit
    fn prune(&self) {
        let mut count = 0;
        while count < MAX_SCAN && self.rotated_path(count + 1).exists() {
            count += 1;
        }

        // Count-based prune first: everything beyond max_backups
        if self.max_backups > 0 {
            for i in (self.max_backups + 1..=count).rev() {
                self.remove_rotated(i);
            }
            count = count.min(self.max_backups);
        }

        // Age-based prune: rotated files age with their index, so walking
        // from the highest index down removes a suffix and leaves no holes
        if self.max_age_days > 0 {
            let cutoff = ChronoDuration::days(i64::from(self.max_age_days));
            for i in (1..=count).rev() {
                let path = self.rotated_path(i);
                let expired = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|modified| {
                        let modified: DateTime<Utc> = modified.into();
                        Utc::now().signed_duration_since(modified) >= cutoff
                    })
                    .unwrap_or(false);
                if !expired {
                    break;
                }
                self.remove_rotated(i);
            }
        }
    }

    fn remove_rotated(&self, number: u32) {
        let path = self.rotated_path(number);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Deleted old log file: {:?}", path),
            Err(e) => warn!("Failed to delete {:?}: {}", path, e),
        }
    }

    /// List the active and rotated log files that currently exist
    #[must_use]
    pub fn list_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if self.path.exists() {
            files.push(self.path.clone());
        }
        let mut i = 1;
        while i < MAX_SCAN && self.rotated_path(i).exists() {
            files.push(self.rotated_path(i));
            i += 1;
        }
        files
    }
}
