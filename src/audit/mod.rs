//! Audit logging for rejected queries
//!
//! Every reject decision can be recorded as one formatted line in an
//! append-only log. Two record formats exist, selected at construction:
//!
//! - `tsv`:  `[YYYY-MM-DD HH:MM:SS]\t<ip>\t<qname>\t<reason>` (local time)
//! - `ltsv`: `time:<unix>\thost:<ip>\tqname:<qname>\tmessage:<reason>`
//!
//! The qname and reason fields are quoted: wrapped in `"…"` with embedded
//! `"` and `\` backslash-escaped and control characters written as `\xNN`.
//!
//! Writes are serialized behind a mutex held for the duration of a single
//! line, so lines from concurrent handlers never interleave. Writes are
//! best-effort: I/O failures on the hot path are swallowed, because failing
//! a DNS response over a lost audit line is the wrong trade.

mod rotation;

pub use rotation::LogRotation;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use chrono::{Local, Utc};

use crate::config::AuditFormat;
use crate::error::{BlockError, BlockResult};

/// One audit record: who asked for what, and which rule rejected it
///
/// The timestamp is not part of the record; it is captured by the sink at
/// emission time.
#[derive(Debug, Clone, Copy)]
pub struct AuditRecord<'a> {
    /// Client IP address the query came from
    pub client_ip: IpAddr,

    /// Normalized query name that was rejected
    pub qname: &'a str,

    /// The matched rule's original text, possibly with alias context
    pub reason: &'a str,
}

/// Active log file state guarded by the sink's mutex
#[derive(Debug)]
struct ActiveLog {
    file: File,
    written: u64,
}

/// Serialized, rotating, best-effort audit writer
///
/// Opening the sink is the only fallible operation; from then on `write`
/// never fails and never blocks longer than one line takes.
#[derive(Debug)]
pub struct AuditSink {
    format: AuditFormat,
    rotation: LogRotation,
    active: Mutex<ActiveLog>,
}

impl AuditSink {
    /// Open (or create) the audit log in append mode
    ///
    /// # Errors
    ///
    /// Returns `BlockError::IoError` if the file cannot be opened. This is
    /// a startup-time failure; the engine surfaces it to the host.
    pub fn open(path: &Path, format: AuditFormat, rotation: LogRotation) -> BlockResult<Self> {
        let file = open_append(path)
            .map_err(|e| BlockError::io(format!("failed to open audit log {}", path.display()), e))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            format,
            rotation,
            active: Mutex::new(ActiveLog { file, written }),
        })
    }

    /// The configured record format
    #[must_use]
    pub fn format(&self) -> AuditFormat {
        self.format
    }

    /// Append one formatted record
    ///
    /// The timestamp is taken now. Rotation happens inside the lock when the
    /// line would push the file over the size threshold. All I/O errors are
    /// swallowed.
    pub fn write(&self, record: &AuditRecord<'_>) {
        let line = self.format_line(record);

        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if self.rotation.should_rotate(active.written, line.len() as u64) {
            // A failed rotation keeps appending to the oversized file
            if self.rotation.rotate().is_ok() {
                if let Ok(file) = open_append(self.rotation.path()) {
                    active.file = file;
                    active.written = 0;
                }
            }
        }

        if active.file.write_all(line.as_bytes()).is_ok() {
            active.written += line.len() as u64;
        }
    }

    fn format_line(&self, record: &AuditRecord<'_>) -> String {
        match self.format {
            AuditFormat::Tsv => {
                let timestamp = Local::now().format("[%Y-%m-%d %H:%M:%S]");
                format!(
                    "{timestamp}\t{}\t{}\t{}\n",
                    record.client_ip,
                    quote(record.qname),
                    quote(record.reason)
                )
            }
            AuditFormat::Ltsv => format!(
                "time:{}\thost:{}\tqname:{}\tmessage:{}\n",
                Utc::now().timestamp(),
                record.client_ip,
                quote(record.qname),
                quote(record.reason)
            ),
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Quote a field: `"…"` with `"` and `\` escaped and control characters as
/// `\xNN`
fn quote(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
