//! Import of untrusted backup documents.
//!
//! Nothing from the document is trusted beyond its JSON types: every field
//! is re-validated and a fresh record is rebuilt from what survives. The
//! event log is never imported.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use ss_core::validate::{is_valid_domain, is_valid_endpoint, is_valid_preset_key};
use ss_core::PresetCatalog;

use crate::error::{Result, StoreError};
use crate::schema::{
    AllowlistEntry, CustomApiEntry, CustomBlockEntry, Language, PresetState, Preferences, STORAGE_VERSION,
};

/// Parse and sanitize a backup document into a record ready to be stored.
///
/// Fails without side effects when the top-level shape is wrong: not an
/// object, `version` not a number, `presets` not an object or `allowlist`
/// not an array. Malformed entries inside otherwise valid collections are
/// dropped individually.
pub fn sanitize_import(json: &str, catalog: &PresetCatalog) -> Result<Preferences> {
    let data: Value =
        serde_json::from_str(json).map_err(|e| StoreError::InvalidImport(format!("not valid JSON: {}", e)))?;

    let object = data
        .as_object()
        .ok_or_else(|| StoreError::InvalidImport("document is not an object".to_string()))?;
    if !object.get("version").is_some_and(Value::is_number) {
        return Err(StoreError::InvalidImport("missing numeric version".to_string()));
    }
    let presets = object
        .get("presets")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::InvalidImport("missing presets object".to_string()))?;
    let allowlist = object
        .get("allowlist")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::InvalidImport("allowlist is not an array".to_string()))?;

    let defaults = Preferences::defaults_for(catalog);
    let sanitized = Preferences {
        version: STORAGE_VERSION,
        presets: sanitize_presets(presets, catalog),
        strict_mode: bool_or(object, "strictMode", defaults.strict_mode),
        global_rewriting: bool_or(object, "globalRewriting", defaults.global_rewriting),
        show_rewrite_notifications: bool_or(object, "showRewriteNotifications", defaults.show_rewrite_notifications),
        language: object
            .get("language")
            .and_then(Value::as_str)
            .and_then(Language::parse)
            .unwrap_or_default(),
        allowlist: sanitize_allowlist(allowlist),
        custom_blocked_domains: sanitize_custom_domains(array_or_empty(object, "customBlockedDomains")),
        custom_blocked_apis: sanitize_custom_apis(array_or_empty(object, "customBlockedApis")),
        rewrite_exceptions: sanitize_rewrite_exceptions(array_or_empty(object, "rewriteExceptions")),
        events: Vec::new(),
    };

    log::info!(
        "Import sanitized: {} presets, {} allowlist, {} custom domains, {} custom APIs, {} rewrite exceptions",
        sanitized.presets.len(),
        sanitized.allowlist.len(),
        sanitized.custom_blocked_domains.len(),
        sanitized.custom_blocked_apis.len(),
        sanitized.rewrite_exceptions.len(),
    );

    Ok(sanitized)
}

fn bool_or(object: &Map<String, Value>, key: &str, default: bool) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn array_or_empty<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object.get(key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn as_timestamp(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn sanitize_presets(presets: &Map<String, Value>, catalog: &PresetCatalog) -> BTreeMap<String, PresetState> {
    let mut sanitized = BTreeMap::new();
    for (key, value) in presets {
        let enabled = value.get("enabled").and_then(Value::as_bool);
        match enabled {
            Some(enabled) if is_valid_preset_key(key) && catalog.contains(key) => {
                sanitized.insert(key.clone(), PresetState { enabled });
            }
            _ => log::warn!("Dropping imported preset {:?}", key),
        }
    }
    sanitized
}

fn sanitize_allowlist(entries: &[Value]) -> Vec<AllowlistEntry> {
    let mut sanitized: Vec<AllowlistEntry> = Vec::new();
    for entry in entries {
        let domain = entry
            .get("domain")
            .and_then(Value::as_str)
            .filter(|d| is_valid_domain(d))
            .map(str::to_ascii_lowercase);
        let expires_at = match entry.get("expiresAt") {
            Some(Value::Null) => Some(None),
            Some(value) => as_timestamp(value).map(Some),
            None => None,
        };
        let created_at = entry.get("createdAt").and_then(as_timestamp);

        match (domain, expires_at, created_at) {
            (Some(domain), Some(expires_at), Some(created_at)) => {
                // At most one entry per domain; a later entry replaces an earlier one.
                sanitized.retain(|existing| existing.domain != domain);
                sanitized.push(AllowlistEntry {
                    domain,
                    expires_at,
                    created_at,
                });
            }
            _ => log::warn!("Dropping malformed allowlist entry"),
        }
    }
    sanitized
}

fn sanitize_custom_domains(entries: &[Value]) -> Vec<CustomBlockEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| {
            let domain = entry.get("domain").and_then(Value::as_str).filter(|d| is_valid_domain(d))?;
            let created_at = entry.get("createdAt").and_then(as_timestamp)?;
            Some(CustomBlockEntry {
                domain: domain.to_ascii_lowercase(),
                created_at,
            })
        })
        .filter(|entry| seen.insert(entry.domain.clone()))
        .collect()
}

fn sanitize_custom_apis(entries: &[Value]) -> Vec<CustomApiEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| {
            let endpoint = entry.get("endpoint").and_then(Value::as_str).filter(|e| is_valid_endpoint(e))?;
            let created_at = entry.get("createdAt").and_then(as_timestamp)?;
            Some(CustomApiEntry {
                endpoint: endpoint.to_ascii_lowercase(),
                created_at,
            })
        })
        .filter(|entry| seen.insert(entry.endpoint.clone()))
        .collect()
}

fn sanitize_rewrite_exceptions(entries: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(Value::as_str)
        .filter(|domain| is_valid_domain(domain))
        .map(str::to_ascii_lowercase)
        .filter(|domain| seen.insert(domain.clone()))
        .collect()
}
