//! Blocked-page controller.
//!
//! The interstitial is opened by a redirect rule with `blocked=<domain>`,
//! or by other callers with `url=<encoded original URL>`. It names the
//! blocked site, offers an alternative when one is registered and lets the
//! user bypass the block for a short time.

use ss_core::rewrite::resolve_alternative;
use ss_core::url::{extract_host, query_param};
use ss_core::{AlternativeLink, PresetCatalog};
use ss_store::{EventKind, PreferenceStore};

use crate::error::{Result, ServiceError};
use crate::message::Message;
use crate::service::ServiceHandle;

pub const ALLOW_ONCE_MS: i64 = 5_000;
pub const ALLOW_TEMPORARILY_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    /// Long enough to complete one navigation.
    Once,
    Temporarily,
}

impl Bypass {
    pub fn duration_ms(self) -> i64 {
        match self {
            Bypass::Once => ALLOW_ONCE_MS,
            Bypass::Temporarily => ALLOW_TEMPORARILY_MS,
        }
    }
}

/// What the blocked page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPage {
    /// The URL the user tried to open, when captured
    pub blocked_url: Option<String>,
    pub domain: Option<String>,
    /// Site name for the heading: catalog name, else the domain
    pub site_name: String,
    pub alternative: Option<AlternativeLink>,
}

impl BlockedPage {
    /// Build from the interstitial's query string.
    pub fn from_query(query: &str, catalog: &PresetCatalog) -> Self {
        let blocked_url = query_param(query, "url")
            .filter(|url| !url.is_empty())
            .or_else(|| {
                query_param(query, "blocked")
                    .filter(|domain| !domain.is_empty())
                    .map(|domain| format!("https://{}/", domain))
            });

        let domain = blocked_url
            .as_deref()
            .and_then(extract_host)
            .map(|host| host.to_ascii_lowercase());
        let site_name = domain
            .as_deref()
            .and_then(|domain| catalog.site_name_for_host(domain).map(str::to_string))
            .or_else(|| domain.clone())
            .unwrap_or_else(|| "this site".to_string());
        let alternative = blocked_url
            .as_deref()
            .and_then(|url| resolve_alternative(catalog, url));

        Self {
            blocked_url,
            domain,
            site_name,
            alternative,
        }
    }

    /// Bypass buttons are disabled when nothing was captured.
    pub fn can_bypass(&self) -> bool {
        self.blocked_url.is_some() && self.domain.is_some()
    }
}

pub struct InterstitialController {
    store: PreferenceStore,
    service: ServiceHandle,
    page: BlockedPage,
}

impl InterstitialController {
    pub fn new(store: PreferenceStore, service: ServiceHandle, query: &str) -> Self {
        let page = BlockedPage::from_query(query, store.catalog());
        Self { store, service, page }
    }

    pub fn page(&self) -> &BlockedPage {
        &self.page
    }

    /// Record the blocked navigation. Does nothing when no URL was captured.
    pub fn on_load(&self) -> Result<()> {
        if let (Some(url), Some(domain)) = (&self.page.blocked_url, &self.page.domain) {
            self.store.log_event(EventKind::BlockedNavigation, url, domain)?;
        }
        Ok(())
    }

    /// Allowlist the blocked domain, reinstall rules and return the URL to
    /// navigate back to.
    ///
    /// Fails with [`ServiceError::RulesNotUpdated`] when the reinstall is
    /// rejected, since navigating would hit the stale redirect.
    pub async fn allow(&self, bypass: Bypass) -> Result<String> {
        let (Some(url), Some(domain)) = (&self.page.blocked_url, &self.page.domain) else {
            return Err(ServiceError::BypassUnavailable);
        };

        self.store.add_allowlist_entry(domain, Some(bypass.duration_ms()))?;
        self.store.log_event(EventKind::BypassGranted, url, domain)?;

        let response = self.service.send(Message::RulesUpdated).await?;
        if !response.success {
            let error = response.error.unwrap_or_else(|| "unknown error".to_string());
            log::warn!("Rule update after bypass failed: {}", error);
            return Err(ServiceError::RulesNotUpdated(error));
        }
        Ok(url.clone())
    }

    pub async fn open_options(&self) -> Result<()> {
        self.service.send(Message::OpenOptions).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_core::AlternativeKind;

    fn page(query: &str) -> BlockedPage {
        BlockedPage::from_query(query, PresetCatalog::builtin())
    }

    #[test]
    fn test_blocked_param_reconstructs_url() {
        let page = page("?blocked=coinmarketcap.com");
        assert_eq!(page.blocked_url.as_deref(), Some("https://coinmarketcap.com/"));
        assert_eq!(page.domain.as_deref(), Some("coinmarketcap.com"));
        assert_eq!(page.site_name, "CoinMarketCap");
        assert!(page.can_bypass());
        let alternative = page.alternative.unwrap();
        assert_eq!(alternative.kind, AlternativeKind::Homepage);
    }

    #[test]
    fn test_url_param_preferred() {
        let page = page("?blocked=coinmarketcap.com&url=https%3A%2F%2Fcoinmarketcap.com%2Fcurrencies%2Fbitcoin%2F");
        assert_eq!(
            page.blocked_url.as_deref(),
            Some("https://coinmarketcap.com/currencies/bitcoin/")
        );
        let alternative = page.alternative.unwrap();
        assert_eq!(alternative.kind, AlternativeKind::Direct);
        assert_eq!(alternative.primary_url, "https://www.coingecko.com/en/coins/bitcoin");
    }

    #[test]
    fn test_unknown_site_uses_domain() {
        let page = page("?blocked=example.org");
        assert_eq!(page.site_name, "example.org");
        assert!(page.alternative.is_none());
        assert!(page.can_bypass());
    }

    #[test]
    fn test_nothing_captured() {
        let page = page("");
        assert_eq!(page.blocked_url, None);
        assert_eq!(page.site_name, "this site");
        assert!(!page.can_bypass());
    }

    #[test]
    fn test_bypass_durations() {
        assert_eq!(Bypass::Once.duration_ms(), 5_000);
        assert_eq!(Bypass::Temporarily.duration_ms(), 600_000);
    }
}
