//! Preference snapshot -> declarative rule set.
//!
//! Compilation is a pure function of its inputs and always rebuilds the
//! full set. Rules are emitted class by class (allow, default block,
//! custom block, strict-mode API block), de-duplicated, then numbered from
//! the start of their class range.

use std::collections::HashMap;

use serde::Serialize;

use ss_core::url::encode_component;
use ss_core::validate::{is_valid_domain, is_valid_endpoint};
use ss_core::{PresetCatalog, Rule, RuleAction, RuleCondition, DEFAULT_BLOCKED_DOMAINS};
use ss_store::Preferences;

use crate::error::CompileError;
use crate::optimizer::{dedupe_patterns, PendingRule};
use crate::rule_class::{verify_class_table, RuleClass};

/// Path of the interstitial page inside the extension package.
pub const INTERSTITIAL_PATH: &str = "pages/blocked/blocked.html";

/// Interstitial URL for a blocked domain, with the domain as `blocked=`.
pub fn interstitial_url(extension_id: &str, domain: &str) -> String {
    format!(
        "chrome-extension://{}/{}?blocked={}",
        extension_id,
        INTERSTITIAL_PATH,
        encode_component(domain)
    )
}

/// Rule counts per class after de-duplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStats {
    pub allow: usize,
    pub default_block: usize,
    pub custom_block: usize,
    pub strict_api_block: usize,
    /// Rules dropped because an earlier rule had the same pattern
    pub deduped: usize,
}

impl CompileStats {
    pub fn total(&self) -> usize {
        self.allow + self.default_block + self.custom_block + self.strict_api_block
    }

    pub fn count(&self, class: RuleClass) -> usize {
        match class {
            RuleClass::Allow => self.allow,
            RuleClass::DefaultBlock => self.default_block,
            RuleClass::CustomBlock => self.custom_block,
            RuleClass::StrictApiBlock => self.strict_api_block,
        }
    }
}

/// Output of one compilation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRuleSet {
    /// In emission order
    pub rules: Vec<Rule>,
    pub stats: CompileStats,
}

impl CompiledRuleSet {
    pub fn rules_of(&self, class: RuleClass) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter().filter(move |rule| class.layout().contains(rule.id))
    }

    /// Rules in the browser's declarative rule JSON shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rules)
    }
}

/// Compile a preference snapshot into a complete rule set.
///
/// `now_ms` decides which allowlist entries are still active. Preset ids
/// in `prefs` that the catalog does not know are ignored.
pub fn compile(
    prefs: &Preferences,
    catalog: &PresetCatalog,
    extension_id: &str,
    now_ms: i64,
) -> Result<CompiledRuleSet, CompileError> {
    verify_class_table()?;

    let mut pending = Vec::new();

    // 1. Allowlist
    for entry in prefs.active_allowlist(now_ms) {
        if !is_valid_domain(&entry.domain) {
            log::warn!("Skipping malformed allowlist domain {:?}", entry.domain);
            continue;
        }
        pending.push(PendingRule {
            class: RuleClass::Allow,
            url_filter: format!("||{}", entry.domain),
            action: RuleAction::Allow,
        });
    }

    // 2. Default domains
    for domain in DEFAULT_BLOCKED_DOMAINS {
        pending.push(redirect_rule(RuleClass::DefaultBlock, domain, extension_id));
    }

    // 3. Custom domains
    for entry in &prefs.custom_blocked_domains {
        if !is_valid_domain(&entry.domain) {
            log::warn!("Skipping malformed custom domain {:?}", entry.domain);
            continue;
        }
        pending.push(redirect_rule(RuleClass::CustomBlock, &entry.domain, extension_id));
    }

    // 4. Strict mode: preset endpoints, then custom endpoints
    if prefs.strict_mode {
        let enabled = catalog
            .list_all()
            .iter()
            .filter(|preset| prefs.preset_enabled(&preset.id));
        for preset in enabled {
            for endpoint in &preset.api_endpoints {
                pending.push(block_rule(endpoint));
            }
        }
        for entry in &prefs.custom_blocked_apis {
            if !is_valid_endpoint(&entry.endpoint) {
                log::warn!("Skipping malformed custom endpoint {:?}", entry.endpoint);
                continue;
            }
            pending.push(block_rule(&entry.endpoint));
        }
    }

    let optimize = dedupe_patterns(&mut pending);
    let (rules, mut stats) = assign_ids(pending)?;
    stats.deduped = optimize.deduped;

    log::debug!(
        "Compiled {} rules: {} allow, {} default, {} custom, {} strict ({} duplicates dropped)",
        stats.total(),
        stats.allow,
        stats.default_block,
        stats.custom_block,
        stats.strict_api_block,
        stats.deduped
    );

    Ok(CompiledRuleSet { rules, stats })
}

fn redirect_rule(class: RuleClass, domain: &str, extension_id: &str) -> PendingRule {
    PendingRule {
        class,
        url_filter: format!("||{}", domain),
        action: RuleAction::redirect_to(interstitial_url(extension_id, domain)),
    }
}

fn block_rule(endpoint: &str) -> PendingRule {
    PendingRule {
        class: RuleClass::StrictApiBlock,
        url_filter: format!("||{}", endpoint),
        action: RuleAction::Block,
    }
}

fn assign_ids(pending: Vec<PendingRule>) -> Result<(Vec<Rule>, CompileStats), CompileError> {
    let mut used: HashMap<RuleClass, usize> = HashMap::new();
    let mut rules = Vec::with_capacity(pending.len());

    for rule in pending {
        let layout = rule.class.layout();
        let offset = used.entry(rule.class).or_insert(0);
        if *offset >= layout.capacity() {
            return Err(CompileError::RangeExhausted {
                class: rule.class,
                capacity: layout.capacity(),
            });
        }
        let id = layout.id_start + *offset as u32;
        *offset += 1;

        rules.push(Rule {
            id,
            priority: layout.priority,
            action: rule.action,
            condition: RuleCondition {
                url_filter: rule.url_filter,
                resource_types: layout.resource_types,
            },
        });
    }

    let count = |class: RuleClass| used.get(&class).copied().unwrap_or(0);
    let stats = CompileStats {
        allow: count(RuleClass::Allow),
        default_block: count(RuleClass::DefaultBlock),
        custom_block: count(RuleClass::CustomBlock),
        strict_api_block: count(RuleClass::StrictApiBlock),
        deduped: 0,
    };
    Ok((rules, stats))
}
