//! Configuration for the name-blocking engine
//!
//! The host resolver embeds [`BlockConfig`] in its own configuration file and
//! hands it to [`PolicyEngine::from_config`](crate::PolicyEngine::from_config)
//! together with the weekly time-range catalog. An empty `rules_file` means
//! the engine is inactive and every query passes.
//!
//! # Example
//!
//! ```
//! use nameblock::{AuditFormat, BlockConfig};
//!
//! let config = BlockConfig::new("/etc/resolver/blocked-names.txt")
//!     .with_audit_file("/var/log/resolver/blocked.log")
//!     .with_audit_format(AuditFormat::Ltsv);
//!
//! assert!(config.is_active());
//! assert!(config.audit_enabled());
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BlockError, BlockResult};

// ============================================================================
// Audit format
// ============================================================================

/// Audit record format
///
/// Selects the textual layout of audit lines written by the
/// [`AuditSink`](crate::AuditSink). The format is fixed at construction
/// time; an unknown format string is a fatal configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditFormat {
    /// Tab-separated values with a bracketed local timestamp
    ///
    /// `[YYYY-MM-DD HH:MM:SS]\t<ip>\t<qname>\t<reason>`
    #[default]
    Tsv,

    /// Labeled tab-separated values with a Unix timestamp
    ///
    /// `time:<unix>\thost:<ip>\tqname:<qname>\tmessage:<reason>`
    Ltsv,
}

impl FromStr for AuditFormat {
    type Err = BlockError;

    fn from_str(s: &str) -> BlockResult<Self> {
        match s {
            "tsv" => Ok(Self::Tsv),
            "ltsv" => Ok(Self::Ltsv),
            other => Err(BlockError::config_field(
                format!("unknown audit format: [{other}]"),
                "audit_format",
            )),
        }
    }
}

impl std::fmt::Display for AuditFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tsv => write!(f, "tsv"),
            Self::Ltsv => write!(f, "ltsv"),
        }
    }
}

// ============================================================================
// Blocking configuration
// ============================================================================

/// Name-blocking configuration
///
/// # Example
///
/// ```
/// use nameblock::BlockConfig;
///
/// let config = BlockConfig::default();
/// assert!(!config.is_active()); // no rules file configured
/// assert!(!config.audit_enabled());
/// assert_eq!(config.log_max_size, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Path to the rule file
    ///
    /// One pattern per line, `#` comments, optional ` @<range-name>` time
    /// gate. An empty path disables the engine entirely.
    #[serde(default)]
    pub rules_file: PathBuf,

    /// Path to the audit log of rejected queries
    ///
    /// `None` disables audit logging; rejects are still applied.
    #[serde(default)]
    pub audit_file: Option<PathBuf>,

    /// Audit record format, `tsv` or `ltsv`
    #[serde(default)]
    pub audit_format: AuditFormat,

    /// Rotate the audit log above this size in megabytes
    ///
    /// Default: 10
    #[serde(default = "default_log_max_size")]
    pub log_max_size: u64,

    /// Delete rotated audit files older than this many days
    ///
    /// Zero keeps files regardless of age. Default: 7
    #[serde(default = "default_log_max_age")]
    pub log_max_age: u32,

    /// Keep at most this many rotated audit files
    ///
    /// Zero keeps all of them. Default: 1
    #[serde(default = "default_log_max_backups")]
    pub log_max_backups: u32,
}

fn default_log_max_size() -> u64 {
    10
}

fn default_log_max_age() -> u32 {
    7
}

fn default_log_max_backups() -> u32 {
    1
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::new(),
            audit_file: None,
            audit_format: AuditFormat::default(),
            log_max_size: default_log_max_size(),
            log_max_age: default_log_max_age(),
            log_max_backups: default_log_max_backups(),
        }
    }
}

impl BlockConfig {
    /// Create a configuration pointing at a rule file
    #[must_use]
    pub fn new(rules_file: impl Into<PathBuf>) -> Self {
        Self {
            rules_file: rules_file.into(),
            ..Self::default()
        }
    }

    /// Enable audit logging to the given path
    #[must_use]
    pub fn with_audit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_file = Some(path.into());
        self
    }

    /// Set the audit record format
    #[must_use]
    pub fn with_audit_format(mut self, format: AuditFormat) -> Self {
        self.audit_format = format;
        self
    }

    /// Set the audit log rotation parameters
    #[must_use]
    pub fn with_rotation(mut self, max_size_mb: u64, max_age_days: u32, max_backups: u32) -> Self {
        self.log_max_size = max_size_mb;
        self.log_max_age = max_age_days;
        self.log_max_backups = max_backups;
        self
    }

    /// Whether the engine is active at all
    ///
    /// An empty `rules_file` means no blocking is configured and every
    /// query passes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.rules_file.as_os_str().is_empty()
    }

    /// Whether audit logging is enabled
    #[must_use]
    pub fn audit_enabled(&self) -> bool {
        self.audit_file
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `BlockError::ConfigError` if audit logging is enabled with a
    /// zero rotation size.
    pub fn validate(&self) -> BlockResult<()> {
        if self.audit_enabled() && self.log_max_size == 0 {
            return Err(BlockError::config_field(
                "log_max_size must be positive when audit logging is enabled",
                "log_max_size",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // AuditFormat Tests
    // ========================================================================

    #[test]
    fn test_audit_format_from_str() {
        assert_eq!("tsv".parse::<AuditFormat>().unwrap(), AuditFormat::Tsv);
        assert_eq!("ltsv".parse::<AuditFormat>().unwrap(), AuditFormat::Ltsv);
    }

    #[test]
    fn test_audit_format_unknown_is_fatal() {
        let err = "csv".parse::<AuditFormat>().unwrap_err();
        assert!(matches!(err, BlockError::ConfigError { .. }));
        assert!(err.to_string().contains("csv"));
    }

    #[test]
    fn test_audit_format_display() {
        assert_eq!(format!("{}", AuditFormat::Tsv), "tsv");
        assert_eq!(format!("{}", AuditFormat::Ltsv), "ltsv");
    }

    #[test]
    fn test_audit_format_serde() {
        let json = serde_json::to_string(&AuditFormat::Ltsv).unwrap();
        assert_eq!(json, "\"ltsv\"");

        let parsed: AuditFormat = serde_json::from_str("\"tsv\"").unwrap();
        assert_eq!(parsed, AuditFormat::Tsv);

        assert!(serde_json::from_str::<AuditFormat>("\"xml\"").is_err());
    }

    // ========================================================================
    // BlockConfig Tests
    // ========================================================================

    #[test]
    fn test_config_default_is_inactive() {
        let config = BlockConfig::default();
        assert!(!config.is_active());
        assert!(!config.audit_enabled());
        assert_eq!(config.audit_format, AuditFormat::Tsv);
        assert_eq!(config.log_max_size, 10);
        assert_eq!(config.log_max_age, 7);
        assert_eq!(config.log_max_backups, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = BlockConfig::new("/etc/blocked-names.txt")
            .with_audit_file("/var/log/blocked.log")
            .with_audit_format(AuditFormat::Ltsv)
            .with_rotation(50, 30, 5);

        assert!(config.is_active());
        assert!(config.audit_enabled());
        assert_eq!(config.audit_format, AuditFormat::Ltsv);
        assert_eq!(config.log_max_size, 50);
        assert_eq!(config.log_max_age, 30);
        assert_eq!(config.log_max_backups, 5);
    }

    #[test]
    fn test_config_empty_audit_path_disables_audit() {
        let config = BlockConfig::new("rules.txt").with_audit_file("");
        assert!(!config.audit_enabled());
    }

    #[test]
    fn test_config_validation() {
        let config = BlockConfig::new("rules.txt").with_audit_file("audit.log");
        assert!(config.validate().is_ok());

        let bad = config.with_rotation(0, 7, 1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_validation_no_audit_ignores_rotation() {
        let config = BlockConfig::new("rules.txt").with_rotation(0, 0, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = BlockConfig::new("/etc/blocked-names.txt")
            .with_audit_file("/var/log/blocked.log")
            .with_audit_format(AuditFormat::Ltsv);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: BlockConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.rules_file, config.rules_file);
        assert_eq!(parsed.audit_file, config.audit_file);
        assert_eq!(parsed.audit_format, AuditFormat::Ltsv);
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let parsed: BlockConfig = serde_json::from_str("{}").unwrap();
        assert!(!parsed.is_active());
        assert_eq!(parsed.log_max_size, 10);
    }
}
