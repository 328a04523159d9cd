//! Rule file parsing
//!
//! Turns the textual rule file into a compiled [`PatternMatcher`]. The line
//! grammar is `<pattern>[ @<time_range_name>]`; `#`-prefixed lines and blank
//! lines are ignored and whitespace around the `@` is trimmed.
//!
//! Loading is best-effort: a malformed line is logged with its line number
//! and skipped, and a reference to an unknown time range is logged but the
//! rule is still inserted without a gate. One bad line never aborts the
//! load.
//!
//! ```text
//! # comment
//! ads.example                  # suffix
//! =strict.example.com          # exact match
//! evil*                        # prefix
//! social.example @weekday-eve  # gated by named time range
//! ```

use tracing::error;

use crate::error::BlockResult;
use crate::pattern::{PatternMatcher, PatternMatcherBuilder};
use crate::weekly::WeeklyRangesCatalog;

/// Parse rule file contents into a compiled matcher
///
/// Time-range names are resolved against `catalog`; an unknown name leaves
/// the rule ungated (always-on) so a typo degrades to stricter blocking
/// rather than silently disabling the rule.
///
/// # Errors
///
/// Returns an error only if the final matcher compilation fails; per-line
/// problems are logged and skipped.
pub fn load_rules(contents: &str, catalog: &WeeklyRangesCatalog) -> BlockResult<PatternMatcher> {
    let mut builder = PatternMatcherBuilder::new();

    for (line_no, raw) in contents.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split('@');
        // split always yields at least one element
        let pattern = parts.next().unwrap_or_default().trim();
        let range_name = match (parts.next(), parts.next()) {
            (None, _) => "",
            (Some(name), None) => name.trim(),
            (Some(_), Some(_)) => {
                error!(line = line_no, "Syntax error in block rules: unexpected @ character");
                continue;
            }
        };

        let gate = if range_name.is_empty() {
            None
        } else {
            match catalog.get(range_name) {
                Some(ranges) => Some(ranges.clone()),
                None => {
                    error!(line = line_no, range = range_name, "Time range not found");
                    None
                }
            }
        };

        if let Err(e) = builder.add(pattern, gate, line_no) {
            error!("{e}");
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weekly::WeeklyRanges;
    use std::sync::Arc;

    fn catalog_with(name: &str) -> WeeklyRangesCatalog {
        let mut catalog = WeeklyRangesCatalog::new();
        catalog.insert(name.to_string(), Arc::new(WeeklyRanges::new([(0, 60)])));
        catalog
    }

    #[test]
    fn test_load_basic_rules() {
        let text = "\
# blocked names
ads.example
=strict.example.com

evil*
*porn*
";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert_eq!(matcher.rule_count(), 4);
        assert!(matcher.eval("foo.ads.example").is_some());
        assert!(matcher.eval("strict.example.com").is_some());
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let text = "# one\n\n   \n# two\n";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_time_gate_bound_by_name() {
        let catalog = catalog_with("work-hours");
        let matcher = load_rules("social.example @work-hours\n", &catalog).unwrap();

        let hit = matcher.eval("social.example").unwrap();
        assert!(hit.time_gate.is_some());
        assert_eq!(hit.pattern, "social.example");
    }

    #[test]
    fn test_gate_name_whitespace_trimmed() {
        let catalog = catalog_with("work-hours");
        let matcher = load_rules("social.example   @  work-hours  \n", &catalog).unwrap();
        assert!(matcher.eval("social.example").unwrap().time_gate.is_some());
    }

    #[test]
    fn test_unknown_range_inserts_ungated_rule() {
        let matcher =
            load_rules("social.example @no-such-range\n", &WeeklyRangesCatalog::new()).unwrap();

        let hit = matcher.eval("social.example").unwrap();
        assert!(hit.time_gate.is_none());
    }

    #[test]
    fn test_double_at_skips_line() {
        let text = "bad@one@two\ngood.example\n";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert_eq!(matcher.rule_count(), 1);
        assert!(matcher.eval("good.example").is_some());
        assert!(matcher.eval("bad").is_none());
    }

    #[test]
    fn test_bad_pattern_skips_line_and_continues() {
        let text = "**\nads.example\n=\n";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert_eq!(matcher.rule_count(), 1);
        assert!(matcher.eval("ads.example").is_some());
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let text = "# header\nads.example\n";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert_eq!(matcher.eval("ads.example").unwrap().line, 2);
    }

    #[test]
    fn test_crlf_tolerated() {
        let text = "ads.example\r\nevil*\r\n";
        let matcher = load_rules(text, &WeeklyRangesCatalog::new()).unwrap();
        assert_eq!(matcher.rule_count(), 2);
        assert!(matcher.eval("x.ads.example").is_some());
    }
}
