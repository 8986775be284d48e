//! Link rewriter controller.
//!
//! Runs for one page. Anchors pointing at a site with a registered
//! alternative are rewritten through the resolver, unless the page itself
//! is a rewrite exception. Storage problems never block the page: settings
//! fall back to permissive defaults and event logging errors are dropped.

use ss_core::rewrite::resolve_alternative;
use ss_core::url::is_domain_or_subdomain;
use ss_core::{AlternativeLink, PresetCatalog};
use ss_store::{EventKind, PreferenceStore};

/// Settings the rewriter reads once per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriterSettings {
    pub show_notifications: bool,
    pub rewrite_exceptions: Vec<String>,
}

impl Default for RewriterSettings {
    fn default() -> Self {
        Self {
            show_notifications: true,
            rewrite_exceptions: Vec::new(),
        }
    }
}

impl RewriterSettings {
    /// Read from the store, or the defaults when the store is unavailable.
    pub fn load(store: &PreferenceStore) -> Self {
        match store.read() {
            Ok(prefs) => Self {
                show_notifications: prefs.show_rewrite_notifications,
                rewrite_exceptions: prefs.rewrite_exceptions,
            },
            Err(e) => {
                log::warn!("Could not load rewriter settings, using defaults: {}", e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRecord {
    pub original: String,
    pub rewritten: String,
}

pub struct LinkRewriter<'a> {
    catalog: &'a PresetCatalog,
    page_host: String,
    settings: RewriterSettings,
    excluded: bool,
    rewritten: Vec<RewriteRecord>,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(catalog: &'a PresetCatalog, page_host: &str, settings: RewriterSettings) -> Self {
        let page_host = page_host.to_ascii_lowercase();
        let excluded = settings
            .rewrite_exceptions
            .iter()
            .any(|exception| is_domain_or_subdomain(&page_host, exception));
        Self {
            catalog,
            page_host,
            settings,
            excluded,
            rewritten: Vec::new(),
        }
    }

    /// Whether the current page is a rewrite exception.
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Rewrite one anchor href. Returns the replacement, if any.
    pub fn rewrite(&mut self, href: &str) -> Option<AlternativeLink> {
        if self.excluded || href.is_empty() {
            return None;
        }
        let link = resolve_alternative(self.catalog, href)?;
        self.rewritten.push(RewriteRecord {
            original: href.to_string(),
            rewritten: link.primary_url.clone(),
        });
        Some(link)
    }

    /// Rewrite a batch of hrefs and log one event per rewrite.
    ///
    /// Returns the records added by this batch.
    pub fn process(&mut self, hrefs: &[&str], store: &PreferenceStore) -> &[RewriteRecord] {
        let before = self.rewritten.len();
        for href in hrefs {
            self.rewrite(href);
        }
        for record in &self.rewritten[before..] {
            if let Err(e) = store.log_event(EventKind::LinkRewritten, &record.original, &self.page_host) {
                log::debug!("Dropping rewrite event: {}", e);
            }
        }
        &self.rewritten[before..]
    }

    pub fn rewritten(&self) -> &[RewriteRecord] {
        &self.rewritten
    }

    /// A notification is shown when enabled and something was rewritten.
    pub fn should_notify(&self) -> bool {
        self.settings.show_notifications && !self.rewritten.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_store::{ManualClock, MemoryStorage, StorageArea, StoreError};

    struct BrokenStorage;

    impl StorageArea for BrokenStorage {
        fn get_all(&self) -> ss_store::Result<serde_json::Map<String, serde_json::Value>> {
            Err(StoreError::Backend("storage unavailable".to_string()))
        }

        fn set(&self, _items: serde_json::Map<String, serde_json::Value>) -> ss_store::Result<()> {
            Err(StoreError::Backend("storage unavailable".to_string()))
        }

        fn remove(&self, _keys: &[String]) -> ss_store::Result<()> {
            Err(StoreError::Backend("storage unavailable".to_string()))
        }

        fn clear(&self) -> ss_store::Result<()> {
            Err(StoreError::Backend("storage unavailable".to_string()))
        }
    }

    fn rewriter(host: &str, exceptions: &[&str]) -> LinkRewriter<'static> {
        let settings = RewriterSettings {
            show_notifications: true,
            rewrite_exceptions: exceptions.iter().map(|e| e.to_string()).collect(),
        };
        LinkRewriter::new(PresetCatalog::builtin(), host, settings)
    }

    #[test]
    fn test_rewrites_currency_links() {
        let mut rewriter = rewriter("news.example.com", &[]);
        let link = rewriter
            .rewrite("https://coinmarketcap.com/currencies/ethereum/")
            .unwrap();
        assert_eq!(link.primary_url, "https://www.coingecko.com/en/coins/ethereum");
        assert!(rewriter.rewrite("https://example.com/").is_none());
        assert_eq!(rewriter.rewritten().len(), 1);
        assert!(rewriter.should_notify());
    }

    #[test]
    fn test_fallbacks() {
        let mut rewriter = rewriter("news.example.com", &[]);
        let search = rewriter.rewrite("https://coinmarketcap.com/exchanges/kraken").unwrap();
        assert_eq!(search.primary_url, "https://www.coingecko.com/en/search?query=kraken");
        let home = rewriter.rewrite("https://coinmarketcap.com/").unwrap();
        assert_eq!(home.primary_url, "https://www.coingecko.com");
    }

    #[test]
    fn test_exception_covers_subdomains() {
        let mut rewriter = rewriter("blog.example.com", &["example.com"]);
        assert!(rewriter.is_excluded());
        assert!(rewriter.rewrite("https://coinmarketcap.com/currencies/bitcoin/").is_none());
        assert!(!rewriter.should_notify());

        assert!(!self::rewriter("notexample.com", &["example.com"]).is_excluded());
    }

    #[test]
    fn test_process_logs_events() {
        let store = PreferenceStore::with_clock(MemoryStorage::new(), ManualClock::new(0));
        let mut rewriter = rewriter("news.example.com", &[]);
        let added = rewriter
            .process(
                &["https://coinmarketcap.com/currencies/solana/", "https://example.com/"],
                &store,
            )
            .len();
        assert_eq!(added, 1);
        let events = store.events(None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::LinkRewritten);
        assert_eq!(events[0].domain, "news.example.com");
    }

    #[test]
    fn test_settings_fail_safe() {
        let store = PreferenceStore::with_clock(BrokenStorage, ManualClock::new(0));
        assert_eq!(RewriterSettings::load(&store), RewriterSettings::default());

        let mut rewriter = LinkRewriter::new(store.catalog(), "example.com", RewriterSettings::load(&store));
        // Logging fails silently.
        assert_eq!(
            rewriter
                .process(&["https://coinmarketcap.com/currencies/bitcoin/"], &store)
                .len(),
            1
        );
    }
}
