//! nameblock: name-blocking policy engine for a DNS proxy
//!
//! This crate decides, for every in-flight DNS query and every CNAME chain
//! in its response, whether the query should be rejected based on a
//! user-supplied ruleset of name patterns, optionally gated by time-of-week
//! windows. Rejects are recorded in a rotating, format-selectable audit log.
//!
//! The DNS transport, upstream resolution, caching and the plugin dispatch
//! framework are external collaborators: they parse messages, build the
//! weekly time-range catalog, construct a [`QueryContext`] per request and
//! act on the decision the engine writes into it.
//!
//! # Architecture
//!
//! ```text
//! rule file ──▶ loader ──▶ PatternMatcher (+ WeeklyRanges catalog)
//!                               │
//! query (qname, session) ──▶ PolicyEngine ──▶ decision on QueryContext
//!                               │                    │ on reject
//! response (answers) ──▶ ResponseWalker             ▼
//!                         (CNAME targets)       AuditSink
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use nameblock::{BlockConfig, PolicyEngine, WeeklyRangesCatalog};
//!
//! # fn main() -> Result<(), nameblock::BlockError> {
//! let config = BlockConfig::new("/etc/resolver/blocked-names.txt")
//!     .with_audit_file("/var/log/resolver/blocked.log");
//! let catalog = WeeklyRangesCatalog::new();
//!
//! // None means no rule file is configured and every query passes
//! let engine = PolicyEngine::from_config(&config, &catalog)?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`audit`]: rotating, serialized audit log writer
//! - [`config`]: host-facing configuration types
//! - [`engine`]: the query-time policy engine and per-query context
//! - [`error`]: error types
//! - [`pattern`]: pattern compilation and evaluation
//! - [`ruleset`]: rule file parsing
//! - [`walker`]: response-side CNAME chain evaluation
//! - [`weekly`]: time-of-week ranges for gated rules

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod ruleset;
pub mod walker;
pub mod weekly;

// Re-export commonly used types at the crate root
pub use audit::{AuditRecord, AuditSink, LogRotation};
pub use config::{AuditFormat, BlockConfig};
pub use engine::{
    Action, EngineStatsSnapshot, PolicyEngine, QueryContext, ReturnCode, Transport,
    WHITELISTED_FLAG,
};
pub use error::{BlockError, BlockResult};
pub use pattern::{PatternMatcher, PatternMatcherBuilder, RuleMatch};
pub use ruleset::load_rules;
pub use walker::ResponseWalker;
pub use weekly::{WeeklyRanges, WeeklyRangesCatalog, MINUTES_PER_WEEK};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
