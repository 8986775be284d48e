//! Persisted preference record.
//!
//! Field names serialize in camelCase so an exported backup has the same
//! shape as the record the extension keeps in browser storage.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ss_core::PresetCatalog;

/// Current schema version. Lower stored versions are migrated on read.
pub const STORAGE_VERSION: u32 = 2;

/// Maximum number of entries kept in the event log.
pub const MAX_EVENTS: usize = 500;

/// Window the options page counts event statistics over.
pub const STATS_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Top-level keys of the stored record, in schema order.
pub const RECORD_KEYS: [&str; 11] = [
    "version",
    "presets",
    "strictMode",
    "globalRewriting",
    "showRewriteNotifications",
    "language",
    "allowlist",
    "customBlockedDomains",
    "customBlockedApis",
    "rewriteExceptions",
    "events",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetState {
    pub enabled: bool,
}

/// UI language preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    System,
    En,
    Tr,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "en" => Some(Self::En),
            "tr" => Some(Self::Tr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistEntry {
    pub domain: String,
    /// Milliseconds since the epoch; `None` never expires
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl AllowlistEntry {
    /// Expired entries are treated as absent but stay in storage.
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBlockEntry {
    pub domain: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomApiEntry {
    pub endpoint: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BlockedNavigation,
    BypassGranted,
    LinkRewritten,
    ApiBlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub url: String,
    pub domain: String,
    pub timestamp: i64,
}

/// The single stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub version: u32,
    pub presets: BTreeMap<String, PresetState>,
    pub strict_mode: bool,
    pub global_rewriting: bool,
    pub show_rewrite_notifications: bool,
    pub language: Language,
    pub allowlist: Vec<AllowlistEntry>,
    pub custom_blocked_domains: Vec<CustomBlockEntry>,
    pub custom_blocked_apis: Vec<CustomApiEntry>,
    pub rewrite_exceptions: Vec<String>,
    pub events: Vec<EventLogEntry>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::defaults_for(PresetCatalog::builtin())
    }
}

impl Preferences {
    /// Documented defaults: catalog presets at their default state, everything else off or empty.
    pub fn defaults_for(catalog: &PresetCatalog) -> Self {
        let presets = catalog
            .list_all()
            .iter()
            .filter(|preset| preset.enabled_by_default)
            .map(|preset| (preset.id.clone(), PresetState { enabled: true }))
            .collect();

        Self {
            version: STORAGE_VERSION,
            presets,
            strict_mode: false,
            global_rewriting: false,
            show_rewrite_notifications: true,
            language: Language::System,
            allowlist: Vec::new(),
            custom_blocked_domains: Vec::new(),
            custom_blocked_apis: Vec::new(),
            rewrite_exceptions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn preset_enabled(&self, id: &str) -> bool {
        self.presets.get(id).is_some_and(|state| state.enabled)
    }

    /// Allowlist entries that have not expired at `now`.
    pub fn active_allowlist(&self, now: i64) -> impl Iterator<Item = &AllowlistEntry> {
        self.allowlist.iter().filter(move |entry| entry.is_active(now))
    }

    /// Overlay stored fields onto `defaults`, field by field.
    ///
    /// A field that is missing or fails to decode keeps its default value.
    /// The version is taken from the stored map when present; callers decide
    /// whether to re-stamp it.
    pub fn overlay(defaults: Self, stored: &Map<String, Value>) -> Self {
        let version = stored
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.version);

        Self {
            version,
            presets: field(stored, "presets", defaults.presets),
            strict_mode: field(stored, "strictMode", defaults.strict_mode),
            global_rewriting: field(stored, "globalRewriting", defaults.global_rewriting),
            show_rewrite_notifications: field(stored, "showRewriteNotifications", defaults.show_rewrite_notifications),
            language: field(stored, "language", defaults.language),
            allowlist: field(stored, "allowlist", defaults.allowlist),
            custom_blocked_domains: field(stored, "customBlockedDomains", defaults.custom_blocked_domains),
            custom_blocked_apis: field(stored, "customBlockedApis", defaults.custom_blocked_apis),
            rewrite_exceptions: field(stored, "rewriteExceptions", defaults.rewrite_exceptions),
            events: field(stored, "events", defaults.events),
        }
    }

    /// The record as a top-level key/value map.
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

fn field<T: DeserializeOwned>(stored: &Map<String, Value>, key: &str, default: T) -> T {
    match stored.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => match T::deserialize(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Stored field '{}' is malformed, using default: {}", key, e);
                default
            }
        },
    }
}

/// Top-level partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<BTreeMap<String, PresetState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_rewriting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_rewrite_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<Vec<AllowlistEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_blocked_domains: Option<Vec<CustomBlockEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_blocked_apis: Option<Vec<CustomApiEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_exceptions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventLogEntry>>,
}

impl PreferencesPatch {
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_enable_builtin_preset() {
        let prefs = Preferences::default();
        assert_eq!(prefs.version, STORAGE_VERSION);
        assert!(prefs.preset_enabled("preset_binance_ecosystem"));
        assert!(!prefs.strict_mode);
        assert!(prefs.show_rewrite_notifications);
        assert!(prefs.events.is_empty());
    }

    #[test]
    fn serializes_camel_case_keys() {
        let map = Preferences::default().to_map().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        for key in RECORD_KEYS {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(map.len(), RECORD_KEYS.len());
    }

    #[test]
    fn overlay_keeps_defaults_for_missing_and_malformed_fields() {
        let stored = json!({
            "version": 1,
            "strictMode": true,
            "globalRewriting": "yes",
            "allowlist": [{"domain": "binance.com", "expiresAt": null, "createdAt": 5}]
        });
        let prefs = Preferences::overlay(Preferences::default(), stored.as_object().unwrap());
        assert_eq!(prefs.version, 1);
        assert!(prefs.strict_mode);
        assert!(!prefs.global_rewriting);
        assert_eq!(prefs.language, Language::System);
        assert_eq!(prefs.allowlist.len(), 1);
        assert!(prefs.preset_enabled("preset_binance_ecosystem"));
    }

    #[test]
    fn allowlist_expiry() {
        let entry = AllowlistEntry {
            domain: "x.com".to_string(),
            expires_at: Some(1_000),
            created_at: 0,
        };
        assert!(entry.is_active(999));
        assert!(!entry.is_active(1_000));
        let permanent = AllowlistEntry { expires_at: None, ..entry };
        assert!(permanent.is_active(i64::MAX));
    }

    #[test]
    fn patch_only_serializes_set_fields() {
        let patch = PreferencesPatch {
            strict_mode: Some(true),
            ..Default::default()
        };
        let map = patch.to_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["strictMode"], json!(true));
    }

    #[test]
    fn event_kind_wire_names() {
        let event = EventLogEntry {
            kind: EventKind::BypassGranted,
            url: "https://binance.com/".to_string(),
            domain: "binance.com".to_string(),
            timestamp: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "bypass_granted");
    }
}
