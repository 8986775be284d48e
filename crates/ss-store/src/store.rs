//! The preference store.
//!
//! All state lives in one record inside a [`StorageArea`]. Reads migrate
//! older records forward; derived accessors filter expired allowlist entries
//! and validate anything admitted into the custom lists. Writes are
//! top-level merges, so every mutator reads the full collection, edits it
//! and writes it back.

use std::sync::Arc;

use serde::Serialize;

use ss_core::url::is_domain_or_subdomain;
use ss_core::validate::{validate_domain, validate_endpoint};
use ss_core::PresetCatalog;

use crate::backend::StorageArea;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::import::sanitize_import;
use crate::schema::{
    AllowlistEntry, CustomApiEntry, CustomBlockEntry, EventKind, EventLogEntry, Language, PresetState, Preferences,
    PreferencesPatch, MAX_EVENTS, STORAGE_VERSION,
};

/// Event counts over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub blocked_navigations: usize,
    pub bypasses_granted: usize,
    pub links_rewritten: usize,
    pub api_blocked: usize,
}

/// Handle on the persisted preference record. Clones share storage and clock.
#[derive(Clone)]
pub struct PreferenceStore {
    storage: Arc<dyn StorageArea>,
    clock: Arc<dyn Clock>,
    catalog: &'static PresetCatalog,
}

impl PreferenceStore {
    /// Store over `storage` using the built-in catalog and the wall clock.
    pub fn new(storage: impl StorageArea + 'static) -> Self {
        Self::with_clock(storage, SystemClock)
    }

    pub fn with_clock(storage: impl StorageArea + 'static, clock: impl Clock + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
            clock: Arc::new(clock),
            catalog: PresetCatalog::builtin(),
        }
    }

    /// Replace the catalog used for defaults and preset validation.
    pub fn with_catalog(mut self, catalog: &'static PresetCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &'static PresetCatalog {
        self.catalog
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    // ========================================================================
    // Record
    // ========================================================================

    /// Read the record, initializing or migrating it first when needed.
    pub fn read(&self) -> Result<Preferences> {
        let stored = self.storage.get_all()?;
        let defaults = Preferences::defaults_for(self.catalog);

        let stored_version = stored.get("version").and_then(|v| v.as_u64());
        let Some(stored_version) = stored_version else {
            log::info!("No stored preferences, initializing v{} defaults", STORAGE_VERSION);
            let mut prefs = Preferences::overlay(defaults, &stored);
            prefs.version = STORAGE_VERSION;
            self.storage.set(prefs.to_map()?)?;
            return Ok(prefs);
        };

        let mut prefs = Preferences::overlay(defaults, &stored);
        if stored_version < u64::from(STORAGE_VERSION) {
            log::info!("Migrating preferences from v{} to v{}", stored_version, STORAGE_VERSION);
            prefs.version = STORAGE_VERSION;
            self.storage.set(prefs.to_map()?)?;
        }
        Ok(prefs)
    }

    /// Merge a partial record at the top level.
    pub fn write(&self, mut patch: PreferencesPatch) -> Result<()> {
        if let Some(events) = patch.events.as_mut() {
            truncate_events(events);
        }
        self.storage.set(patch.to_map()?)
    }

    // ========================================================================
    // Presets and flags
    // ========================================================================

    pub fn presets(&self) -> Result<std::collections::BTreeMap<String, PresetState>> {
        Ok(self.read()?.presets)
    }

    pub fn set_preset_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        if !self.catalog.contains(id) {
            return Err(StoreError::UnknownPreset(id.to_string()));
        }
        let mut presets = self.read()?.presets;
        presets.insert(id.to_string(), PresetState { enabled });
        self.write(PreferencesPatch {
            presets: Some(presets),
            ..Default::default()
        })
    }

    pub fn strict_mode(&self) -> Result<bool> {
        Ok(self.read()?.strict_mode)
    }

    pub fn set_strict_mode(&self, enabled: bool) -> Result<()> {
        self.write(PreferencesPatch {
            strict_mode: Some(enabled),
            ..Default::default()
        })
    }

    pub fn global_rewriting(&self) -> Result<bool> {
        Ok(self.read()?.global_rewriting)
    }

    pub fn set_global_rewriting(&self, enabled: bool) -> Result<()> {
        self.write(PreferencesPatch {
            global_rewriting: Some(enabled),
            ..Default::default()
        })
    }

    pub fn show_rewrite_notifications(&self) -> Result<bool> {
        Ok(self.read()?.show_rewrite_notifications)
    }

    pub fn set_show_rewrite_notifications(&self, enabled: bool) -> Result<()> {
        self.write(PreferencesPatch {
            show_rewrite_notifications: Some(enabled),
            ..Default::default()
        })
    }

    pub fn language(&self) -> Result<Language> {
        Ok(self.read()?.language)
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        self.write(PreferencesPatch {
            language: Some(language),
            ..Default::default()
        })
    }

    // ========================================================================
    // Allowlist
    // ========================================================================

    /// Active allowlist entries. Expired entries stay stored but are not returned.
    pub fn allowlist(&self) -> Result<Vec<AllowlistEntry>> {
        let now = self.now();
        Ok(self.read()?.active_allowlist(now).cloned().collect())
    }

    /// Allow `domain` for `duration_ms`, or permanently when `None`.
    ///
    /// Replaces any existing entry for the same domain.
    pub fn add_allowlist_entry(&self, domain: &str, duration_ms: Option<i64>) -> Result<AllowlistEntry> {
        let domain = validate_domain(domain)?;
        let now = self.now();
        let entry = AllowlistEntry {
            domain,
            expires_at: duration_ms.map(|duration| now.saturating_add(duration)),
            created_at: now,
        };

        let mut allowlist = self.read()?.allowlist;
        allowlist.retain(|existing| existing.domain != entry.domain);
        allowlist.push(entry.clone());
        self.write(PreferencesPatch {
            allowlist: Some(allowlist),
            ..Default::default()
        })?;

        log::debug!("Allowlisted {} until {:?}", entry.domain, entry.expires_at);
        Ok(entry)
    }

    /// Returns whether an entry was removed.
    pub fn remove_allowlist_entry(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_ascii_lowercase();
        let mut allowlist = self.read()?.allowlist;
        let before = allowlist.len();
        allowlist.retain(|entry| entry.domain != domain);
        if allowlist.len() == before {
            return Ok(false);
        }
        self.write(PreferencesPatch {
            allowlist: Some(allowlist),
            ..Default::default()
        })?;
        Ok(true)
    }

    /// True when an active entry covers `domain` exactly or as a parent domain.
    pub fn is_domain_allowed(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_ascii_lowercase();
        let now = self.now();
        Ok(self
            .read()?
            .active_allowlist(now)
            .any(|entry| is_domain_or_subdomain(&domain, &entry.domain)))
    }

    // ========================================================================
    // Custom block lists
    // ========================================================================

    pub fn custom_blocked_domains(&self) -> Result<Vec<CustomBlockEntry>> {
        Ok(self.read()?.custom_blocked_domains)
    }

    /// Returns `false` when the domain was already present.
    pub fn add_custom_blocked_domain(&self, domain: &str) -> Result<bool> {
        let domain = validate_domain(domain)?;
        let mut domains = self.read()?.custom_blocked_domains;
        if domains.iter().any(|entry| entry.domain == domain) {
            return Ok(false);
        }
        domains.push(CustomBlockEntry {
            domain,
            created_at: self.now(),
        });
        self.write(PreferencesPatch {
            custom_blocked_domains: Some(domains),
            ..Default::default()
        })?;
        Ok(true)
    }

    pub fn remove_custom_blocked_domain(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_ascii_lowercase();
        let mut domains = self.read()?.custom_blocked_domains;
        let before = domains.len();
        domains.retain(|entry| entry.domain != domain);
        if domains.len() == before {
            return Ok(false);
        }
        self.write(PreferencesPatch {
            custom_blocked_domains: Some(domains),
            ..Default::default()
        })?;
        Ok(true)
    }

    pub fn custom_blocked_apis(&self) -> Result<Vec<CustomApiEntry>> {
        Ok(self.read()?.custom_blocked_apis)
    }

    /// Returns `false` when the endpoint was already present.
    pub fn add_custom_blocked_api(&self, endpoint: &str) -> Result<bool> {
        let endpoint = validate_endpoint(endpoint)?;
        let mut apis = self.read()?.custom_blocked_apis;
        if apis.iter().any(|entry| entry.endpoint == endpoint) {
            return Ok(false);
        }
        apis.push(CustomApiEntry {
            endpoint,
            created_at: self.now(),
        });
        self.write(PreferencesPatch {
            custom_blocked_apis: Some(apis),
            ..Default::default()
        })?;
        Ok(true)
    }

    pub fn remove_custom_blocked_api(&self, endpoint: &str) -> Result<bool> {
        let endpoint = endpoint.trim().to_ascii_lowercase();
        let mut apis = self.read()?.custom_blocked_apis;
        let before = apis.len();
        apis.retain(|entry| entry.endpoint != endpoint);
        if apis.len() == before {
            return Ok(false);
        }
        self.write(PreferencesPatch {
            custom_blocked_apis: Some(apis),
            ..Default::default()
        })?;
        Ok(true)
    }

    // ========================================================================
    // Rewrite exceptions
    // ========================================================================

    pub fn rewrite_exceptions(&self) -> Result<Vec<String>> {
        Ok(self.read()?.rewrite_exceptions)
    }

    pub fn add_rewrite_exception(&self, domain: &str) -> Result<bool> {
        let domain = validate_domain(domain)?;
        let mut exceptions = self.read()?.rewrite_exceptions;
        if exceptions.contains(&domain) {
            return Ok(false);
        }
        exceptions.push(domain);
        self.write(PreferencesPatch {
            rewrite_exceptions: Some(exceptions),
            ..Default::default()
        })?;
        Ok(true)
    }

    pub fn remove_rewrite_exception(&self, domain: &str) -> Result<bool> {
        let domain = domain.trim().to_ascii_lowercase();
        let mut exceptions = self.read()?.rewrite_exceptions;
        let before = exceptions.len();
        exceptions.retain(|existing| *existing != domain);
        if exceptions.len() == before {
            return Ok(false);
        }
        self.write(PreferencesPatch {
            rewrite_exceptions: Some(exceptions),
            ..Default::default()
        })?;
        Ok(true)
    }

    // ========================================================================
    // Event log
    // ========================================================================

    /// Append an event, evicting the oldest entries beyond the cap.
    pub fn log_event(&self, kind: EventKind, url: &str, domain: &str) -> Result<()> {
        let mut events = self.read()?.events;
        events.push(EventLogEntry {
            kind,
            url: url.to_string(),
            domain: domain.to_string(),
            timestamp: self.now(),
        });
        self.write(PreferencesPatch {
            events: Some(events),
            ..Default::default()
        })
    }

    /// Events with a timestamp at or after `since`, or all events.
    pub fn events(&self, since: Option<i64>) -> Result<Vec<EventLogEntry>> {
        let mut events = self.read()?.events;
        if let Some(since) = since {
            events.retain(|event| event.timestamp >= since);
        }
        Ok(events)
    }

    pub fn clear_events(&self) -> Result<()> {
        self.write(PreferencesPatch {
            events: Some(Vec::new()),
            ..Default::default()
        })
    }

    pub fn event_stats(&self, since: i64) -> Result<EventStats> {
        let mut stats = EventStats::default();
        for event in self.events(Some(since))? {
            match event.kind {
                EventKind::BlockedNavigation => stats.blocked_navigations += 1,
                EventKind::BypassGranted => stats.bypasses_granted += 1,
                EventKind::LinkRewritten => stats.links_rewritten += 1,
                EventKind::ApiBlocked => stats.api_blocked += 1,
            }
        }
        Ok(stats)
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// The full record as pretty-printed JSON.
    pub fn export_data(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.read()?)?)
    }

    /// Replace the record with a sanitized copy of an untrusted document.
    ///
    /// Structural failures return before storage is touched. The record is
    /// written in one `set`; keys outside the schema are removed afterwards.
    pub fn import_data(&self, json: &str) -> Result<Preferences> {
        let sanitized = sanitize_import(json, self.catalog)?;
        let map = sanitized.to_map()?;
        let stale: Vec<String> = self
            .storage
            .get_all()?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| !map.contains_key(key))
            .collect();

        self.storage.set(map)?;
        if !stale.is_empty() {
            self.storage.remove(&stale)?;
        }
        log::info!("Imported preferences");
        Ok(sanitized)
    }
}

fn truncate_events(events: &mut Vec<EventLogEntry>) {
    if events.len() > MAX_EVENTS {
        let excess = events.len() - MAX_EVENTS;
        events.drain(..excess);
    }
}
