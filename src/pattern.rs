//! Pattern matcher for blocking rules
//!
//! Compiles rule patterns into per-kind containers and evaluates query names
//! against them. Five kinds exist, classified from the pattern syntax:
//!
//! | Syntax                         | Kind      |
//! |--------------------------------|-----------|
//! | `=name`                        | Exact     |
//! | `name` (no wildcards)          | Suffix    |
//! | `*name` (leading `*` only)     | Suffix    |
//! | `name*` (trailing `*` only)    | Prefix    |
//! | `*name*` (both ends)           | Substring |
//! | any other `*` / `?` usage      | Pattern   |
//!
//! The bare form is a suffix match because DNS names are hierarchical: a
//! rule `ads.example` must match `foo.ads.example`. Suffix matching is
//! label-aligned, so `fooads.example` does not match.
//!
//! Evaluation order is Exact, then Suffix, Prefix, Substring, Pattern; the
//! first container with a hit wins, and inside a container the
//! first-inserted matching rule wins. The matcher is built once at load
//! time and read-only afterwards, so it can be shared across query handlers
//! without synchronization.
//!
//! # Performance
//!
//! - Exact: O(1) hash lookup
//! - Suffix: Aho-Corasick over reversed names, sub-linear in the rule count
//! - Prefix / Substring / Pattern: ordered linear scans; these containers
//!   are expected to stay small
//!
//! # Example
//!
//! ```
//! use nameblock::PatternMatcherBuilder;
//!
//! let mut builder = PatternMatcherBuilder::new();
//! builder.add("ads.example", None, 1).unwrap();
//! builder.add("=only.example", None, 2).unwrap();
//! let matcher = builder.build().unwrap();
//!
//! let hit = matcher.eval("foo.ads.example.").unwrap();
//! assert_eq!(hit.pattern, "ads.example");
//! assert!(matcher.eval("sub.only.example").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::error::{BlockError, BlockResult};
use crate::weekly::WeeklyRanges;

/// Normalize a DNS name for matching: lowercase, one trailing root dot
/// stripped
pub(crate) fn normalize_name(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_ascii_lowercase()
}

/// A compiled rule: the pattern as written, its source line, and the
/// optional weekly time gate
#[derive(Debug, Clone)]
struct CompiledRule {
    text: String,
    line: usize,
    gate: Option<Arc<WeeklyRanges>>,
}

/// Result of a successful match
///
/// Carries the matched rule's original text (used verbatim as the audit
/// reason) and its time gate. The caller decides whether the gate currently
/// holds; a match alone is not yet a reject.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    /// The rule pattern exactly as written in the rule file
    pub pattern: &'a str,

    /// 1-based rule-file line the pattern came from
    pub line: usize,

    /// Weekly range gating the rule, if any
    pub time_gate: Option<&'a WeeklyRanges>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder collecting rules before compilation
///
/// `add` classifies each pattern and rejects malformed ones with a
/// line-numbered syntax error; the loader logs and skips those. `build`
/// compiles the suffix automaton and freezes the matcher.
#[derive(Debug, Default)]
pub struct PatternMatcherBuilder {
    rules: Vec<CompiledRule>,
    exact: Vec<(String, usize)>,
    suffixes: Vec<(String, usize)>,
    prefixes: Vec<(String, usize)>,
    substrings: Vec<(String, usize)>,
    wildcards: Vec<(Regex, usize)>,
}

impl PatternMatcherBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one rule pattern
    ///
    /// The pattern is trimmed, lowercased and classified by its syntax. The
    /// time gate, if any, travels with the rule and is returned by
    /// [`PatternMatcher::eval`] for the caller to check.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::SyntaxError` for an empty or malformed pattern;
    /// the builder state is unchanged in that case.
    pub fn add(
        &mut self,
        pattern: &str,
        gate: Option<Arc<WeeklyRanges>>,
        line: usize,
    ) -> BlockResult<()> {
        let text = pattern.trim();
        if text.is_empty() {
            return Err(BlockError::syntax(line, "empty pattern"));
        }

        let lowered = text.to_ascii_lowercase();
        let bytes = lowered.as_bytes();
        let leading_star = bytes.first() == Some(&b'*');
        let trailing_star = bytes.last() == Some(&b'*');
        let has_inner_wildcard = bytes
            .iter()
            .enumerate()
            .any(|(i, &b)| b == b'?' || (b == b'*' && i != 0 && i != bytes.len() - 1));

        let idx = self.rules.len();
        if has_inner_wildcard {
            if bytes.len() < 2 {
                return Err(BlockError::syntax(line, "wildcard pattern too short"));
            }
            let regex = glob_to_regex(&lowered)
                .map_err(|e| BlockError::syntax(line, format!("invalid wildcard pattern: {e}")))?;
            self.wildcards.push((regex, idx));
        } else if leading_star && trailing_star {
            if bytes.len() < 3 {
                return Err(BlockError::syntax(line, "substring pattern too short"));
            }
            self.substrings
                .push((lowered[1..lowered.len() - 1].to_string(), idx));
        } else if trailing_star {
            self.prefixes
                .push((lowered[..lowered.len() - 1].to_string(), idx));
        } else if let Some(rest) = lowered.strip_prefix('=') {
            let name = rest.strip_suffix('.').unwrap_or(rest);
            if name.is_empty() {
                return Err(BlockError::syntax(line, "exact pattern is empty"));
            }
            self.exact.push((name.to_string(), idx));
        } else {
            // Bare or `*name` form: suffix match on the remaining labels
            let suffix = lowered.strip_prefix('*').unwrap_or(&lowered);
            let suffix = suffix.strip_prefix('.').unwrap_or(suffix);
            let suffix = suffix.strip_suffix('.').unwrap_or(suffix);
            if suffix.is_empty() {
                return Err(BlockError::syntax(line, "suffix pattern is empty"));
            }
            self.suffixes.push((suffix.to_string(), idx));
        }

        self.rules.push(CompiledRule {
            text: text.to_string(),
            line,
            gate,
        });
        Ok(())
    }

    /// Number of rules collected so far
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Compile the collected rules into an immutable matcher
    ///
    /// # Errors
    ///
    /// Returns `BlockError::ConfigError` if the suffix automaton cannot be
    /// built.
    pub fn build(self) -> BlockResult<PatternMatcher> {
        // Earlier rules dominate later duplicates
        let mut exact = HashMap::with_capacity(self.exact.len());
        for (name, idx) in self.exact {
            exact.entry(name).or_insert(idx);
        }

        let (suffix_automaton, suffix_patterns, suffix_rules) = if self.suffixes.is_empty() {
            (None, Vec::new(), Vec::new())
        } else {
            let mut patterns = Vec::with_capacity(self.suffixes.len());
            let mut rules = Vec::with_capacity(self.suffixes.len());
            for (suffix, idx) in self.suffixes {
                // "ads.example" is stored reversed with a leading dot, so a
                // hit anchored at the start of the reversed name is a
                // label-aligned suffix candidate
                let mut reversed = String::with_capacity(suffix.len() + 1);
                reversed.push('.');
                reversed.extend(suffix.chars().rev());
                patterns.push(reversed);
                rules.push(idx);
            }

            let automaton = AhoCorasick::builder().build(&patterns).map_err(|e| {
                BlockError::config(format!("failed to build suffix automaton: {e}"))
            })?;
            (Some(automaton), patterns, rules)
        };

        Ok(PatternMatcher {
            rules: self.rules,
            exact,
            suffix_automaton,
            suffix_rules,
            prefixes: self.prefixes,
            substrings: self.substrings,
            wildcards: self.wildcards,
            suffix_pattern_count: suffix_patterns.len(),
        })
    }
}

/// Translate a shell-style wildcard pattern (`*`, `?`) into an anchored
/// regular expression
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 4);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' | '|' => {
                expr.push('\\');
                expr.push(ch);
            }
            _ => expr.push(ch),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

// ============================================================================
// Matcher
// ============================================================================

/// Immutable compiled rule set
///
/// Built once by [`PatternMatcherBuilder`] and read-only afterwards; safe to
/// share across threads without locking.
#[derive(Debug)]
pub struct PatternMatcher {
    /// All compiled rules in insertion order; every rule lives in exactly
    /// one of the containers below, which index into this vector
    rules: Vec<CompiledRule>,

    /// Exact name to rule index (first insertion wins)
    exact: HashMap<String, usize>,

    /// Automaton over reversed suffix patterns
    suffix_automaton: Option<AhoCorasick>,
    /// Rule index per automaton pattern id
    suffix_rules: Vec<usize>,

    /// Prefix patterns in insertion order
    prefixes: Vec<(String, usize)>,

    /// Substring patterns in insertion order
    substrings: Vec<(String, usize)>,

    /// Compiled wildcard patterns in insertion order
    wildcards: Vec<(Regex, usize)>,

    suffix_pattern_count: usize,
}

impl PatternMatcher {
    /// Evaluate a query name against every rule
    ///
    /// The name is normalized (lowercased, trailing root dot stripped)
    /// before matching. Returns the winning rule's text and time gate, or
    /// `None` when nothing matches. Infallible and deterministic.
    #[must_use]
    pub fn eval(&self, name: &str) -> Option<RuleMatch<'_>> {
        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }

        if let Some(&idx) = self.exact.get(name.as_str()) {
            return Some(self.rule_match(idx));
        }
        if let Some(idx) = self.match_suffix(&name) {
            return Some(self.rule_match(idx));
        }
        if let Some(idx) = self
            .prefixes
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|&(_, idx)| idx)
        {
            return Some(self.rule_match(idx));
        }
        if let Some(idx) = self
            .substrings
            .iter()
            .find(|(needle, _)| name.contains(needle.as_str()))
            .map(|&(_, idx)| idx)
        {
            return Some(self.rule_match(idx));
        }
        self.wildcards
            .iter()
            .find(|(regex, _)| regex.is_match(&name))
            .map(|&(_, idx)| self.rule_match(idx))
    }

    /// Suffix lookup over the reversed name
    ///
    /// The name is reversed with a leading dot and scanned for overlapping
    /// automaton hits anchored at position 0. A hit is label-aligned when
    /// it consumes the whole haystack or stops right before a dot. Among
    /// valid hits the lowest rule index wins, preserving rule-file order.
    fn match_suffix(&self, name: &str) -> Option<usize> {
        let automaton = self.suffix_automaton.as_ref()?;

        let mut haystack = String::with_capacity(name.len() + 1);
        haystack.push('.');
        haystack.extend(name.chars().rev());

        let mut winner: Option<usize> = None;
        for mat in automaton.find_overlapping_iter(&haystack) {
            if mat.start() != 0 {
                continue;
            }
            let end = mat.end();
            if end == haystack.len() || haystack.as_bytes().get(end) == Some(&b'.') {
                let idx = self.suffix_rules[mat.pattern().as_usize()];
                winner = Some(winner.map_or(idx, |w| w.min(idx)));
            }
        }
        winner
    }

    fn rule_match(&self, idx: usize) -> RuleMatch<'_> {
        let rule = &self.rules[idx];
        RuleMatch {
            pattern: &rule.text,
            line: rule.line,
            time_gate: rule.gate.as_deref(),
        }
    }

    /// Total number of compiled rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of exact rules (duplicates collapse onto the first)
    #[must_use]
    pub fn exact_count(&self) -> usize {
        self.exact.len()
    }

    /// Number of suffix rules
    #[must_use]
    pub fn suffix_count(&self) -> usize {
        self.suffix_pattern_count
    }

    /// Number of prefix rules
    #[must_use]
    pub fn prefix_count(&self) -> usize {
        self.prefixes.len()
    }

    /// Number of substring rules
    #[must_use]
    pub fn substring_count(&self) -> usize {
        self.substrings.len()
    }

    /// Number of wildcard rules
    #[must_use]
    pub fn wildcard_count(&self) -> usize {
        self.wildcards.len()
    }
}
