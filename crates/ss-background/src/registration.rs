//! Link-rewriter content script registration.

use ss_core::PresetCatalog;
use ss_store::PreferenceStore;

use crate::error::Result;
use crate::platform::{ContentScript, Platform, RunAt};

pub const LINK_REWRITER_ID: &str = "link-rewriter";
pub const LINK_REWRITER_JS: &str = "content/link-rewriter.js";

/// The link rewriter runs everywhere except on the blocked sites themselves.
pub fn link_rewriter_script(catalog: &PresetCatalog) -> ContentScript {
    let mut exclude_matches: Vec<String> = Vec::new();
    for pattern in catalog.domain_patterns() {
        let exclude = pattern.exclude_match();
        if !exclude_matches.contains(&exclude) {
            exclude_matches.push(exclude);
        }
    }

    ContentScript {
        id: LINK_REWRITER_ID.to_string(),
        matches: vec!["<all_urls>".to_string()],
        exclude_matches,
        js: vec![LINK_REWRITER_JS.to_string()],
        run_at: RunAt::DocumentIdle,
    }
}

/// Bring the registration in line with `globalRewriting`.
///
/// Returns whether the script is registered afterwards.
pub fn update_content_script_registration(store: &PreferenceStore, platform: &dyn Platform) -> Result<bool> {
    let enabled = store.global_rewriting()?;

    if let Err(e) = platform.unregister_content_scripts(&[LINK_REWRITER_ID]) {
        log::debug!("Link rewriter was not registered: {}", e);
    }

    if enabled {
        platform.register_content_scripts(vec![link_rewriter_script(store.catalog())])?;
        log::info!("Link rewriter registered");
    } else {
        log::info!("Link rewriter unregistered");
    }
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;
    use ss_store::{ManualClock, MemoryStorage};

    #[test]
    fn test_script_shape() {
        let script = link_rewriter_script(PresetCatalog::builtin());
        assert_eq!(script.id, "link-rewriter");
        assert_eq!(script.matches, vec!["<all_urls>"]);
        assert_eq!(script.js, vec!["content/link-rewriter.js"]);
        assert_eq!(script.run_at, RunAt::DocumentIdle);
        assert!(script.exclude_matches.contains(&"*://binance.com/*".to_string()));
        assert!(script.exclude_matches.contains(&"*://*.coinmarketcap.com/*".to_string()));
        assert_eq!(script.exclude_matches.len(), 8);
    }

    #[test]
    fn test_toggle_registration() {
        let store = PreferenceStore::with_clock(MemoryStorage::new(), ManualClock::new(0));
        let platform = MemoryPlatform::new();

        // Disabled and never registered: the failed unregister is ignored.
        assert!(!update_content_script_registration(&store, &platform).unwrap());
        assert!(platform.registered().is_empty());

        store.set_global_rewriting(true).unwrap();
        assert!(update_content_script_registration(&store, &platform).unwrap());
        // Re-running replaces rather than duplicating.
        assert!(update_content_script_registration(&store, &platform).unwrap());
        assert_eq!(platform.registered().len(), 1);

        store.set_global_rewriting(false).unwrap();
        assert!(!update_content_script_registration(&store, &platform).unwrap());
        assert!(platform.registered().is_empty());
    }
}
