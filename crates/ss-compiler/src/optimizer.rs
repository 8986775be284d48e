//! Pattern de-duplication before id assignment.
//!
//! Two pending rules collide when they apply the same action to the same
//! normalized url filter over the same resource types.

use std::collections::HashSet;

use ss_core::url::normalize_pattern;
use ss_core::RuleAction;

use crate::rule_class::RuleClass;

/// A rule before its id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRule {
    pub class: RuleClass,
    pub url_filter: String,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop rules whose normalized pattern, action and resource scope repeat an
/// earlier rule. The first occurrence wins, so earlier classes shadow later
/// ones (default before custom, preset endpoints before custom endpoints).
pub fn dedupe_patterns(rules: &mut Vec<PendingRule>) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            log::debug!("Dropping duplicate {} rule for {}", rule.class, rule.url_filter);
            deduped += 1;
            false
        }
    });

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    pattern: String,
    action: &'static str,
    resource_types: u16,
}

impl From<&PendingRule> for RuleKey {
    fn from(rule: &PendingRule) -> Self {
        Self {
            pattern: normalize_pattern(&rule.url_filter),
            action: rule.action.kind(),
            resource_types: rule.class.layout().resource_types.bits(),
        }
    }
}
