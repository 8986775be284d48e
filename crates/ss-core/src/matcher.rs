//! Request matching over an installed rule set.
//!
//! This evaluates requests the way the browser's declarative engine does,
//! so compiled rule sets can be checked without a browser: every matching
//! rule is a candidate, the highest priority wins, and among equal
//! priorities allow beats block beats redirect.

use crate::types::{MatchDecision, MatchResult, RequestContext, Rule, RuleAction};
use crate::url::url_filter_matches;

/// Matcher over a borrowed rule set.
pub struct Matcher<'a> {
    rules: &'a [Rule],
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a [Rule]) -> Self {
        Self { rules }
    }

    /// All rules whose condition matches the request, in installation order.
    pub fn candidates(&self, ctx: &RequestContext<'_>) -> Vec<&'a Rule> {
        self.rules
            .iter()
            .filter(|rule| {
                rule.resource_types().intersects(ctx.request_type) && url_filter_matches(rule.url_filter(), ctx.url)
            })
            .collect()
    }

    /// Match a request and return the winning decision.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let winner = self.candidates(ctx).into_iter().min_by_key(|rule| {
            (
                std::cmp::Reverse(rule.priority),
                rule.action.precedence(),
                rule.id,
            )
        });

        match winner {
            None => MatchResult::default(),
            Some(rule) => match &rule.action {
                RuleAction::Allow => MatchResult {
                    decision: MatchDecision::Allow,
                    rule_id: Some(rule.id),
                    redirect_url: None,
                },
                RuleAction::Block => MatchResult {
                    decision: MatchDecision::Block,
                    rule_id: Some(rule.id),
                    redirect_url: None,
                },
                RuleAction::Redirect { redirect } => MatchResult {
                    decision: MatchDecision::Redirect,
                    rule_id: Some(rule.id),
                    redirect_url: Some(redirect.url.clone()),
                },
            },
        }
    }

    /// Convenience: true when the request is blocked or redirected.
    pub fn should_block(&self, ctx: &RequestContext<'_>) -> bool {
        self.match_request(ctx).decision != MatchDecision::Allow
    }
}
