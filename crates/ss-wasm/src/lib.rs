//! WebAssembly bindings for SourceSwitch
//!
//! The extension's JavaScript shell owns browser storage and the
//! declarative engine; it passes the stored record in as JSON and gets rule
//! sets, sanitized imports and resolved alternatives back.

use serde::Serialize;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

use ss_compiler::{compile, CompileStats};
use ss_core::{rewrite, validate, PresetCatalog, Rule};
use ss_store::{Clock, Preferences};

// ============================================================================
// Clock
// ============================================================================

/// `Date.now()` as a store clock.
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}

fn js_error(message: String) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

fn parse_json(json: &str) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(json).map_err(|_| JsValue::from_str("Failed to parse result JSON"))
}

// ============================================================================
// Rule compilation
// ============================================================================

#[derive(Serialize)]
struct CompileOutput {
    rules: Vec<Rule>,
    stats: CompileStats,
}

/// Decode a stored record leniently, the same way the store reads it.
fn preferences_from_json(prefs_json: &str) -> Result<Preferences, String> {
    let stored: Map<String, Value> = match serde_json::from_str(prefs_json) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err("Preferences must be a JSON object".to_string()),
        Err(e) => return Err(format!("Invalid preferences JSON: {}", e)),
    };
    Ok(Preferences::overlay(Preferences::default(), &stored))
}

fn compile_rules_json(prefs_json: &str, extension_id: &str, now_ms: i64) -> Result<String, String> {
    let prefs = preferences_from_json(prefs_json)?;
    let compiled = compile(&prefs, PresetCatalog::builtin(), extension_id, now_ms).map_err(|e| e.to_string())?;
    let output = CompileOutput {
        rules: compiled.rules,
        stats: compiled.stats,
    };
    serde_json::to_string(&output).map_err(|e| e.to_string())
}

/// Compile the stored record into `{rules, stats}`.
///
/// `now_ms` defaults to `Date.now()`.
#[wasm_bindgen]
pub fn compile_rules(prefs_json: &str, extension_id: &str, now_ms: Option<f64>) -> Result<JsValue, JsValue> {
    let now = now_ms.map_or_else(|| JsClock.now_ms(), |now| now as i64);
    let json = compile_rules_json(prefs_json, extension_id, now).map_err(js_error)?;
    parse_json(&json)
}

// ============================================================================
// Import
// ============================================================================

fn sanitize_import_json(json: &str) -> Result<String, String> {
    let sanitized = ss_store::sanitize_import(json, PresetCatalog::builtin()).map_err(|e| e.to_string())?;
    serde_json::to_string(&sanitized).map_err(|e| e.to_string())
}

/// Validate an untrusted backup and return the record to store.
#[wasm_bindgen]
pub fn sanitize_import(json: &str) -> Result<JsValue, JsValue> {
    let sanitized = sanitize_import_json(json).map_err(js_error)?;
    parse_json(&sanitized)
}

// ============================================================================
// Alternatives and URL helpers
// ============================================================================

#[wasm_bindgen]
pub fn resolve_alternative(url: &str) -> JsValue {
    let result = js_sys::Object::new();
    let Some(link) = rewrite::resolve_alternative(PresetCatalog::builtin(), url) else {
        let _ = js_sys::Reflect::set(&result, &"hasAlternative".into(), &JsValue::from(false));
        return result.into();
    };

    let kind = match link.kind {
        ss_core::AlternativeKind::Direct => "direct",
        ss_core::AlternativeKind::Search => "search",
        ss_core::AlternativeKind::Homepage => "homepage",
    };
    let _ = js_sys::Reflect::set(&result, &"hasAlternative".into(), &JsValue::from(true));
    let _ = js_sys::Reflect::set(&result, &"kind".into(), &JsValue::from_str(kind));
    let _ = js_sys::Reflect::set(&result, &"siteName".into(), &JsValue::from_str(&link.site_name));
    let _ = js_sys::Reflect::set(&result, &"primaryButton".into(), &JsValue::from_str(&link.primary_button));
    let _ = js_sys::Reflect::set(&result, &"primaryUrl".into(), &JsValue::from_str(&link.primary_url));
    if let (Some(button), Some(url)) = (&link.secondary_button, &link.secondary_url) {
        let _ = js_sys::Reflect::set(&result, &"secondaryButton".into(), &JsValue::from_str(button));
        let _ = js_sys::Reflect::set(&result, &"secondaryUrl".into(), &JsValue::from_str(url));
    }
    result.into()
}

#[wasm_bindgen]
pub fn extract_cmc_slug(url: &str) -> Option<String> {
    rewrite::extract_cmc_slug(url)
}

#[wasm_bindgen]
pub fn build_coingecko_url(cmc_url: &str) -> Option<String> {
    rewrite::build_coingecko_url(cmc_url)
}

/// Display name of the blocked site `url` belongs to.
#[wasm_bindgen]
pub fn blocked_site_name(url: &str) -> Option<String> {
    let host = ss_core::url::extract_host(url)?;
    PresetCatalog::builtin()
        .site_name_for_host(&host.to_ascii_lowercase())
        .map(str::to_string)
}

#[wasm_bindgen]
pub fn is_valid_domain(domain: &str) -> bool {
    validate::is_valid_domain(domain)
}

#[wasm_bindgen]
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    validate::is_valid_endpoint(endpoint)
}

#[wasm_bindgen]
pub fn preset_ids() -> JsValue {
    let ids = js_sys::Array::new();
    for id in PresetCatalog::builtin().list_ids() {
        ids.push(&JsValue::from_str(id));
    }
    ids.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_from_stored_json() {
        let json = compile_rules_json(
            r#"{"version": 1, "strictMode": true, "allowlist": [{"domain": "binance.com", "expiresAt": 10, "createdAt": 0}]}"#,
            "ext",
            5,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["allow"], 1);
        assert_eq!(value["stats"]["defaultBlock"], 4);
        assert_eq!(value["stats"]["strictApiBlock"], 10);
        assert_eq!(value["rules"][0]["action"]["type"], "allow");
    }

    #[test]
    fn test_compile_rejects_non_object() {
        assert!(compile_rules_json("[]", "ext", 0).is_err());
        assert!(compile_rules_json("{", "ext", 0).is_err());
    }

    #[test]
    fn test_sanitize_import_json() {
        let json = sanitize_import_json(
            r#"{"version": 1, "presets": {}, "allowlist": [{"domain": "<script>evil</script>", "expiresAt": null, "createdAt": 1}]}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["allowlist"], serde_json::json!([]));
        assert_eq!(value["events"], serde_json::json!([]));
        assert!(sanitize_import_json("{}").is_err());
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(
            extract_cmc_slug("https://coinmarketcap.com/currencies/bitcoin/").as_deref(),
            Some("bitcoin")
        );
        assert_eq!(
            build_coingecko_url("https://coinmarketcap.com/currencies/binancecoin/").as_deref(),
            Some("https://www.coingecko.com/en/coins/binancecoin")
        );
        assert_eq!(blocked_site_name("https://WWW.Binance.com/en").as_deref(), Some("Binance"));
        assert_eq!(blocked_site_name("not a url"), None);
        assert!(is_valid_domain("example.com"));
        assert!(!is_valid_endpoint("api.example.com/v1?x"));
    }
}
