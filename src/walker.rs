//! Response-side CNAME chain evaluation
//!
//! A query that passes the name check can still resolve through a blocked
//! intermediary: trackers hide behind CNAME records pointing into blocked
//! zones. The walker inspects the answer section of each upstream response
//! and submits every CNAME target back to the engine as an alias of the
//! original question.
//!
//! Work on pathological responses is bounded: at most eight CNAME records
//! are inspected per response, counted over CNAME records only, so
//! interleaved address records do not consume the budget.

use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, RData, RecordType};

use crate::engine::{PolicyEngine, QueryContext};

/// Maximum number of CNAME answer records inspected per response
const ALIAS_LIMIT: usize = 8;

/// Walks the CNAME records of a response through the policy engine
#[derive(Debug, Clone)]
pub struct ResponseWalker {
    alias_limit: usize,
}

impl ResponseWalker {
    /// Create a walker with the default alias budget of 8
    #[must_use]
    pub fn new() -> Self {
        Self {
            alias_limit: ALIAS_LIMIT,
        }
    }

    /// The configured alias budget
    #[must_use]
    pub fn alias_limit(&self) -> usize {
        self.alias_limit
    }

    /// Check a response's CNAME targets against the engine
    ///
    /// Answer records are visited in order. Records that are not
    /// Internet-class CNAMEs are skipped without consuming the budget.
    /// Stops at the first block or once the budget is spent. Responses
    /// without exactly one question are ignored.
    pub fn walk(&self, engine: &PolicyEngine, ctx: &mut QueryContext, response: &Message) {
        let queries = response.queries();
        if queries.len() != 1 {
            return;
        }
        let alias_for = queries[0].name().to_string();

        let mut aliases_left = self.alias_limit;
        for answer in response.answers() {
            if answer.dns_class() != DNSClass::IN || answer.record_type() != RecordType::CNAME {
                continue;
            }
            let Some(RData::CNAME(target)) = answer.data() else {
                continue;
            };
            let target = target.0.to_string();
            if engine.check(ctx, &target, Some(&alias_for)) {
                return;
            }
            aliases_left -= 1;
            if aliases_left == 0 {
                return;
            }
        }
    }
}

impl Default for ResponseWalker {
    fn default() -> Self {
        Self::new()
    }
}
