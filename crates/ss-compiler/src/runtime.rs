//! Enforcement runtime interface and rule replacement.
//!
//! The runtime holds the installed dynamic rules and applies them to
//! requests. Replacement is always remove-all then add-all; a failure after
//! the removal is reported as an inconsistent state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use ss_core::{MatchResult, Matcher, RequestContext, Rule};

use crate::error::{InstallError, RuntimeError};

/// Dynamic rule limit of the browser's declarative engine.
pub const MAX_DYNAMIC_RULES: usize = 5000;

/// One batched change to the installed rules. Removals apply before additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub remove_rule_ids: Vec<u32>,
    pub add_rules: Vec<Rule>,
}

/// The platform's request-filtering engine.
pub trait RuleRuntime: Send + Sync {
    /// Every dynamically installed rule.
    fn dynamic_rules(&self) -> Result<Vec<Rule>, RuntimeError>;

    /// Apply an update atomically: either all of it takes effect or none.
    fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuntimeError>;
}

/// What a successful replacement did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub removed: usize,
    pub added: usize,
}

/// Replace every installed dynamic rule with `rules`.
///
/// Enumerates the installed set, removes it in one call, then adds the new
/// set in one call. Overlapping replacements are tolerated: the last one to
/// finish wins.
pub fn install_rules(runtime: &dyn RuleRuntime, rules: Vec<Rule>) -> Result<InstallReport, InstallError> {
    let existing = runtime.dynamic_rules().map_err(|e| {
        log::error!("Failed to enumerate dynamic rules: {}", e);
        InstallError::Enumerate(e)
    })?;

    let remove_rule_ids: Vec<u32> = existing.iter().map(|rule| rule.id).collect();
    let removed = remove_rule_ids.len();
    if removed > 0 {
        runtime
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids,
                add_rules: Vec::new(),
            })
            .map_err(|e| {
                log::error!("Failed to remove {} dynamic rules: {}", removed, e);
                InstallError::Remove(e)
            })?;
    }

    let added = rules.len();
    if added > 0 {
        runtime
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: Vec::new(),
                add_rules: rules,
            })
            .map_err(|e| {
                log::error!(
                    "Removed {} dynamic rules but failed to add {}: {}; enforcement is inconsistent",
                    removed,
                    added,
                    e
                );
                InstallError::Add { removed, source: e }
            })?;
    }

    log::debug!("Installed {} rules (replaced {})", added, removed);
    Ok(InstallReport { removed, added })
}

// ============================================================================
// In-memory runtime
// ============================================================================

/// In-process runtime that evaluates requests with [`Matcher`].
///
/// Clones share the same installed set.
#[derive(Debug, Clone)]
pub struct InMemoryRuntime {
    rules: Arc<Mutex<Vec<Rule>>>,
    limit: usize,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::with_limit(MAX_DYNAMIC_RULES)
    }
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            rules: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Rule>> {
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the installed rules, in installation order.
    pub fn rules(&self) -> Vec<Rule> {
        self.lock().clone()
    }

    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let rules = self.lock();
        Matcher::new(&rules).match_request(ctx)
    }
}

impl RuleRuntime for InMemoryRuntime {
    fn dynamic_rules(&self) -> Result<Vec<Rule>, RuntimeError> {
        Ok(self.rules())
    }

    fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuntimeError> {
        let mut installed = self.lock();

        let removed: HashSet<u32> = update.remove_rule_ids.into_iter().collect();
        let mut next: Vec<Rule> = installed
            .iter()
            .filter(|rule| !removed.contains(&rule.id))
            .cloned()
            .collect();

        let mut ids: HashSet<u32> = next.iter().map(|rule| rule.id).collect();
        for rule in &update.add_rules {
            if !ids.insert(rule.id) {
                return Err(RuntimeError::DuplicateId(rule.id));
            }
        }
        next.extend(update.add_rules);
        if next.len() > self.limit {
            return Err(RuntimeError::LimitExceeded { limit: self.limit });
        }

        *installed = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_core::{MatchDecision, ResourceType, RuleAction, RuleCondition};

    fn rule(id: u32, filter: &str) -> Rule {
        Rule {
            id,
            priority: 1,
            action: RuleAction::Block,
            condition: RuleCondition {
                url_filter: filter.to_string(),
                resource_types: ResourceType::MAIN_FRAME,
            },
        }
    }

    /// Runtime whose n-th update call fails.
    struct FailingRuntime {
        inner: InMemoryRuntime,
        fail_on_call: usize,
        calls: Mutex<usize>,
    }

    impl RuleRuntime for FailingRuntime {
        fn dynamic_rules(&self) -> Result<Vec<Rule>, RuntimeError> {
            self.inner.dynamic_rules()
        }

        fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuntimeError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == self.fail_on_call {
                return Err(RuntimeError::Rejected("quota".to_string()));
            }
            self.inner.update_dynamic_rules(update)
        }
    }

    #[test]
    fn test_install_replaces_everything() {
        let runtime = InMemoryRuntime::new();
        install_rules(&runtime, vec![rule(1, "||a.com"), rule(2, "||b.com")]).unwrap();
        let report = install_rules(&runtime, vec![rule(1, "||c.com")]).unwrap();
        assert_eq!(report, InstallReport { removed: 2, added: 1 });
        assert_eq!(runtime.rules(), vec![rule(1, "||c.com")]);
    }

    #[test]
    fn test_install_is_idempotent() {
        let runtime = InMemoryRuntime::new();
        let rules = vec![rule(1, "||a.com")];
        install_rules(&runtime, rules.clone()).unwrap();
        install_rules(&runtime, rules.clone()).unwrap();
        assert_eq!(runtime.rules(), rules);
    }

    #[test]
    fn test_update_rejects_duplicate_ids_atomically() {
        let runtime = InMemoryRuntime::new();
        runtime
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![rule(1, "||a.com")],
            })
            .unwrap();
        let err = runtime
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![rule(2, "||b.com"), rule(1, "||c.com")],
            })
            .unwrap_err();
        assert_eq!(err, RuntimeError::DuplicateId(1));
        assert_eq!(runtime.rules().len(), 1);
    }

    #[test]
    fn test_limit_enforced() {
        let runtime = InMemoryRuntime::with_limit(1);
        let err = install_rules(&runtime, vec![rule(1, "||a.com"), rule(2, "||b.com")]).unwrap_err();
        assert!(matches!(err, InstallError::Add { removed: 0, .. }));
    }

    #[test]
    fn test_add_failure_after_remove_is_inconsistent() {
        let runtime = FailingRuntime {
            inner: InMemoryRuntime::new(),
            fail_on_call: 3,
            calls: Mutex::new(0),
        };
        install_rules(&runtime, vec![rule(1, "||a.com")]).unwrap();
        let err = install_rules(&runtime, vec![rule(1, "||b.com")]).unwrap_err();
        assert_eq!(
            err,
            InstallError::Add {
                removed: 1,
                source: RuntimeError::Rejected("quota".to_string()),
            }
        );
        assert!(err.is_inconsistent());
        assert!(runtime.inner.rules().is_empty());
    }

    #[test]
    fn test_remove_failure_keeps_old_rules() {
        let runtime = FailingRuntime {
            inner: InMemoryRuntime::new(),
            fail_on_call: 2,
            calls: Mutex::new(0),
        };
        install_rules(&runtime, vec![rule(1, "||a.com")]).unwrap();
        let err = install_rules(&runtime, vec![rule(1, "||b.com")]).unwrap_err();
        assert!(matches!(err, InstallError::Remove(_)));
        assert!(!err.is_inconsistent());
        assert_eq!(runtime.inner.rules(), vec![rule(1, "||a.com")]);
    }

    #[test]
    fn test_match_request_uses_installed_rules() {
        let runtime = InMemoryRuntime::new();
        install_rules(&runtime, vec![rule(1, "||a.com")]).unwrap();
        let result = runtime.match_request(&RequestContext::main_frame("https://www.a.com/"));
        assert_eq!(result.decision, MatchDecision::Block);
        assert_eq!(result.rule_id, Some(1));
    }
}
