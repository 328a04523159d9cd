//! Query-time policy engine
//!
//! [`PolicyEngine`] is the facade the request dispatch layer calls for every
//! incoming query and every upstream response. It owns the compiled
//! [`PatternMatcher`], the optional [`AuditSink`], and the response walker.
//!
//! The engine is handed to the dispatch layer once at startup and shared by
//! reference; all state it touches after construction is either immutable or
//! internally synchronized, so no further locking is needed. A host without
//! a configured rule file simply has no engine and every query passes.
//!
//! # Example
//!
//! ```
//! use std::net::SocketAddr;
//! use nameblock::{load_rules, PolicyEngine, QueryContext, Transport, Action};
//! use nameblock::WeeklyRangesCatalog;
//! use hickory_proto::op::{Message, Query};
//! use hickory_proto::rr::{Name, RecordType};
//! use std::str::FromStr;
//!
//! let matcher = load_rules("ads.example\n", &WeeklyRangesCatalog::new()).unwrap();
//! let engine = PolicyEngine::new(matcher, None);
//!
//! let mut query = Message::new();
//! query.add_query(Query::query(Name::from_str("foo.ads.example.").unwrap(), RecordType::A));
//!
//! let client: SocketAddr = "192.0.2.5:53000".parse().unwrap();
//! let mut ctx = QueryContext::new(client, Transport::Udp);
//! engine.evaluate_query(&mut ctx, &query);
//! assert_eq!(ctx.action, Action::Reject);
//! ```

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use hickory_proto::op::Message;
use tracing::info;

use crate::audit::{AuditRecord, AuditSink, LogRotation};
use crate::config::BlockConfig;
use crate::error::{BlockError, BlockResult};
use crate::pattern::{normalize_name, PatternMatcher};
use crate::ruleset::load_rules;
use crate::walker::ResponseWalker;
use crate::weekly::WeeklyRangesCatalog;

/// Session flag that bypasses name blocking entirely
///
/// Set on the session by the whitelisting collaborator before this engine
/// runs; its presence (any value) short-circuits evaluation.
pub const WHITELISTED_FLAG: &str = "whitelisted";

/// What the dispatch layer should do with the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Continue normal processing
    #[default]
    Forward,
    /// Drop the query and synthesize a refusal
    Reject,
}

/// Return code reported on the synthesized response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnCode {
    /// No opinion; downstream plugins decide
    #[default]
    Pass,
    /// The query was rejected by policy
    Reject,
}

/// Transport the query arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Datagram transport
    Udp,
    /// Stream transport
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Per-query state threaded through plugin evaluation
///
/// Created by the dispatch layer for each request and discarded afterwards.
/// The engine reads the client address and session flags and writes the
/// decision.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address the query came from
    pub client: SocketAddr,

    /// Transport the query arrived over
    pub transport: Transport,

    /// Free-form session flags set by other collaborators
    pub session_flags: HashMap<String, String>,

    /// Decision slot, initially [`Action::Forward`]
    pub action: Action,

    /// Return code slot, initially [`ReturnCode::Pass`]
    pub return_code: ReturnCode,
}

impl QueryContext {
    /// Create a context for one query
    #[must_use]
    pub fn new(client: SocketAddr, transport: Transport) -> Self {
        Self {
            client,
            transport,
            session_flags: HashMap::new(),
            action: Action::default(),
            return_code: ReturnCode::default(),
        }
    }

    /// Set a session flag
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_flags.insert(key.into(), value.into());
        self
    }

    /// Whether the session is whitelisted and must bypass blocking
    #[must_use]
    pub fn is_whitelisted(&self) -> bool {
        self.session_flags.contains_key(WHITELISTED_FLAG)
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct EngineStats {
    names_evaluated: AtomicU64,
    names_rejected: AtomicU64,
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Names run through the matcher (queries and CNAME targets)
    pub names_evaluated: u64,

    /// Names that produced a reject decision
    pub names_rejected: u64,
}

// ============================================================================
// PolicyEngine
// ============================================================================

/// The name-blocking policy engine
///
/// Immutable after construction apart from atomic counters and the audit
/// sink's internal lock; share it behind an `Arc` across request handlers.
#[derive(Debug)]
pub struct PolicyEngine {
    matcher: PatternMatcher,
    audit: Option<AuditSink>,
    walker: ResponseWalker,
    stats: EngineStats,
}

impl PolicyEngine {
    /// Create an engine from a compiled matcher and an optional audit sink
    #[must_use]
    pub fn new(matcher: PatternMatcher, audit: Option<AuditSink>) -> Self {
        Self {
            matcher,
            audit,
            walker: ResponseWalker::new(),
            stats: EngineStats::default(),
        }
    }

    /// Build the engine from host configuration
    ///
    /// Reads the rule file, compiles the matcher against `catalog`, and
    /// opens the audit sink when one is configured. Returns `Ok(None)` when
    /// no rule file is configured: blocking is simply inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the rule file
    /// cannot be read, or the audit log cannot be opened. All of these fail
    /// startup; nothing here is deferred to query time.
    pub fn from_config(
        config: &BlockConfig,
        catalog: &WeeklyRangesCatalog,
    ) -> BlockResult<Option<Self>> {
        config.validate()?;
        if !config.is_active() {
            return Ok(None);
        }

        info!("Loading the set of blocking rules from [{}]", config.rules_file.display());
        let contents = fs::read_to_string(&config.rules_file).map_err(|e| {
            BlockError::io(
                format!("failed to read rules file {}", config.rules_file.display()),
                e,
            )
        })?;
        let matcher = load_rules(&contents, catalog)?;

        let audit = match &config.audit_file {
            Some(path) if config.audit_enabled() => {
                let rotation = LogRotation::new(
                    path.clone(),
                    config.log_max_size,
                    config.log_max_age,
                    config.log_max_backups,
                );
                Some(AuditSink::open(path, config.audit_format, rotation)?)
            }
            _ => None,
        };

        info!(rules = matcher.rule_count(), "Name blocking enabled");
        Ok(Some(Self::new(matcher, audit)))
    }

    /// Evaluate an incoming query
    ///
    /// Whitelisted sessions and messages without exactly one question are
    /// left untouched. On a (time-gate permitting) match the context's
    /// action and return code are set to reject and an audit line is
    /// written before this returns.
    pub fn evaluate_query(&self, ctx: &mut QueryContext, msg: &Message) {
        if ctx.is_whitelisted() {
            return;
        }
        let queries = msg.queries();
        if queries.len() != 1 {
            return;
        }
        let qname = queries[0].name().to_string();
        self.check(ctx, &qname, None);
    }

    /// Evaluate an upstream response's CNAME chain
    ///
    /// Each Internet-class CNAME target in the answer section is checked as
    /// an alias of the original question, up to the walker's alias budget.
    pub fn evaluate_response(&self, ctx: &mut QueryContext, msg: &Message) {
        if ctx.is_whitelisted() {
            return;
        }
        self.walker.walk(self, ctx, msg);
    }

    /// Check one name against the rules and apply the decision
    ///
    /// Returns whether the name was rejected. `alias_for` carries the
    /// original qname when the name under test came out of a CNAME chain.
    pub(crate) fn check(
        &self,
        ctx: &mut QueryContext,
        qname: &str,
        alias_for: Option<&str>,
    ) -> bool {
        self.stats.names_evaluated.fetch_add(1, Ordering::Relaxed);

        let qname = normalize_name(qname);
        let Some(hit) = self.matcher.eval(&qname) else {
            return false;
        };
        if let Some(gate) = hit.time_gate {
            if !gate.matches_now() {
                return false;
            }
        }

        let mut reason = hit.pattern.to_string();
        if let Some(alias) = alias_for {
            let alias = alias.strip_suffix('.').unwrap_or(alias);
            reason.push_str(" (alias for [");
            reason.push_str(alias);
            reason.push_str("])");
        }

        ctx.action = Action::Reject;
        ctx.return_code = ReturnCode::Reject;

        // The audit line lands before the reject is visible to the caller
        if let Some(audit) = &self.audit {
            audit.write(&AuditRecord {
                client_ip: ctx.client.ip(),
                qname: &qname,
                reason: &reason,
            });
        }

        self.stats.names_rejected.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Reload is not supported; rule sets are immutable for the process
    /// lifetime and the host rebuilds the engine instead. No-op.
    pub fn reload(&self) {}

    /// Number of compiled rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.matcher.rule_count()
    }

    /// Whether the audit sink is configured
    #[must_use]
    pub fn audit_enabled(&self) -> bool {
        self.audit.is_some()
    }

    /// Current counter values
    #[must_use]
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            names_evaluated: self.stats.names_evaluated.load(Ordering::Relaxed),
            names_rejected: self.stats.names_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weekly::{WeeklyRanges, MINUTES_PER_WEEK};
    use hickory_proto::op::Query;
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;
    use std::sync::Arc;

    fn engine_with_rules(text: &str) -> PolicyEngine {
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        PolicyEngine::new(matcher, None)
    }

    fn ctx() -> QueryContext {
        QueryContext::new("192.0.2.5:53000".parse().unwrap(), Transport::Udp)
    }

    fn query_for(name: &str) -> Message {
        let mut msg = Message::new();
        msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
        msg
    }

    // ========================================================================
    // QueryContext Tests
    // ========================================================================

    #[test]
    fn test_context_defaults() {
        let ctx = ctx();
        assert_eq!(ctx.action, Action::Forward);
        assert_eq!(ctx.return_code, ReturnCode::Pass);
        assert!(!ctx.is_whitelisted());
    }

    #[test]
    fn test_whitelisted_flag() {
        let ctx = ctx().with_flag(WHITELISTED_FLAG, "1");
        assert!(ctx.is_whitelisted());
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(format!("{}", Transport::Udp), "udp");
        assert_eq!(format!("{}", Transport::Tcp), "tcp");
    }

    // ========================================================================
    // Query Evaluation Tests
    // ========================================================================

    #[test]
    fn test_matching_query_rejected() {
        let engine = engine_with_rules("ads.example\n");
        let mut ctx = ctx();

        engine.evaluate_query(&mut ctx, &query_for("foo.ads.example."));

        assert_eq!(ctx.action, Action::Reject);
        assert_eq!(ctx.return_code, ReturnCode::Reject);
    }

    #[test]
    fn test_non_matching_query_passes() {
        let engine = engine_with_rules("ads.example\n");
        let mut ctx = ctx();

        engine.evaluate_query(&mut ctx, &query_for("clean.example."));

        assert_eq!(ctx.action, Action::Forward);
        assert_eq!(ctx.return_code, ReturnCode::Pass);
    }

    #[test]
    fn test_whitelisted_session_bypasses() {
        let engine = engine_with_rules("ads.example\n");
        let mut ctx = ctx().with_flag(WHITELISTED_FLAG, "1");

        engine.evaluate_query(&mut ctx, &query_for("foo.ads.example."));

        assert_eq!(ctx.action, Action::Forward);
        assert_eq!(engine.stats().names_evaluated, 0);
    }

    #[test]
    fn test_zero_questions_is_noop() {
        let engine = engine_with_rules("ads.example\n");
        let mut ctx = ctx();

        engine.evaluate_query(&mut ctx, &Message::new());

        assert_eq!(ctx.action, Action::Forward);
    }

    #[test]
    fn test_multiple_questions_is_noop() {
        let engine = engine_with_rules("ads.example\n");
        let mut msg = query_for("ads.example.");
        msg.add_query(Query::query(
            Name::from_str("other.example.").unwrap(),
            RecordType::A,
        ));
        let mut ctx = ctx();

        engine.evaluate_query(&mut ctx, &msg);

        assert_eq!(ctx.action, Action::Forward);
    }

    // ========================================================================
    // Time Gate Tests
    // ========================================================================

    #[test]
    fn test_always_on_gate_rejects() {
        let mut catalog = WeeklyRangesCatalog::new();
        catalog.insert(
            "always".to_string(),
            Arc::new(WeeklyRanges::new([(0, MINUTES_PER_WEEK)])),
        );
        let matcher = load_rules("social.example @always\n", &catalog).unwrap();
        let engine = PolicyEngine::new(matcher, None);

        let mut ctx = ctx();
        engine.evaluate_query(&mut ctx, &query_for("social.example."));
        assert_eq!(ctx.action, Action::Reject);
    }

    #[test]
    fn test_never_on_gate_passes() {
        let mut catalog = WeeklyRangesCatalog::new();
        catalog.insert("never".to_string(), Arc::new(WeeklyRanges::new([])));
        let matcher = load_rules("social.example @never\n", &catalog).unwrap();
        let engine = PolicyEngine::new(matcher, None);

        let mut ctx = ctx();
        engine.evaluate_query(&mut ctx, &query_for("social.example."));
        assert_eq!(ctx.action, Action::Forward);
        // The rule matched but the gate did not hold
        assert_eq!(engine.stats().names_rejected, 0);
    }

    // ========================================================================
    // Stats Tests
    // ========================================================================

    #[test]
    fn test_stats_counters() {
        let engine = engine_with_rules("ads.example\n");
        let mut ctx = ctx();

        engine.evaluate_query(&mut ctx, &query_for("ads.example."));
        let mut ctx2 = ctx.clone();
        ctx2.action = Action::Forward;
        engine.evaluate_query(&mut ctx2, &query_for("clean.example."));

        let stats = engine.stats();
        assert_eq!(stats.names_evaluated, 2);
        assert_eq!(stats.names_rejected, 1);
    }

    // ========================================================================
    // Construction Tests
    // ========================================================================

    #[test]
    fn test_from_config_inactive() {
        let engine =
            PolicyEngine::from_config(&BlockConfig::default(), &WeeklyRangesCatalog::new())
                .unwrap();
        assert!(engine.is_none());
    }

    #[test]
    fn test_from_config_missing_rules_file_fails() {
        let config = BlockConfig::new("/nonexistent/blocked-names.txt");
        let err = PolicyEngine::from_config(&config, &WeeklyRangesCatalog::new()).unwrap_err();
        assert!(matches!(err, BlockError::IoError { .. }));
    }

    #[test]
    fn test_from_config_loads_rules() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let rules_path = dir.path().join("blocked-names.txt");
        let mut file = fs::File::create(&rules_path).unwrap();
        writeln!(file, "ads.example").unwrap();
        writeln!(file, "evil*").unwrap();

        let config = BlockConfig::new(&rules_path);
        let engine = PolicyEngine::from_config(&config, &WeeklyRangesCatalog::new())
            .unwrap()
            .unwrap();
        assert_eq!(engine.rule_count(), 2);
        assert!(!engine.audit_enabled());
    }

    #[test]
    fn test_reload_is_noop() {
        let engine = engine_with_rules("ads.example\n");
        engine.reload();
        assert_eq!(engine.rule_count(), 1);
    }
}
