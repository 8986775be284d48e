//! Link Rewrite Resolver
//!
//! Maps a URL on a blocked site to the equivalent page on an alternative
//! site. Used by the interstitial page for its alternative button and by the
//! link rewriter for anchors. Pure and deterministic.

use crate::catalog::{Alternative, PresetCatalog};
use crate::url::{extract_host, extract_path};

/// How specific a resolved alternative link is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeKind {
    /// Slug extracted, direct page on the alternative site
    Direct,
    /// No slug, but a path fragment to search for
    Search,
    /// Nothing usable in the URL, alternative homepage
    Homepage,
}

/// A resolved alternative for a blocked URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeLink {
    pub kind: AlternativeKind,
    /// Display name of the alternative site
    pub site_name: String,
    pub primary_button: String,
    pub primary_url: String,
    pub secondary_button: Option<String>,
    pub secondary_url: Option<String>,
}

/// Resolve the alternative for `url` using any preset in the catalog.
pub fn resolve_alternative(catalog: &PresetCatalog, url: &str) -> Option<AlternativeLink> {
    let host = extract_host(url)?;
    let alternative = catalog.alternative_for_host(host)?;
    Some(resolve_with(alternative, url))
}

/// Resolve `url` against a specific alternative whose domain is known to match.
pub fn resolve_with(alternative: &Alternative, url: &str) -> AlternativeLink {
    if let Some(slug) = alternative.extract_slug(url) {
        let target_slug = alternative.override_slug(&slug);
        let (secondary_button, secondary_url) = match (&alternative.secondary_button, &alternative.secondary_url) {
            (Some(button), Some(template)) => (Some(button.clone()), Some(template.render(&slug))),
            _ => (None, None),
        };
        return AlternativeLink {
            kind: AlternativeKind::Direct,
            site_name: alternative.display_name.clone(),
            primary_button: alternative.primary_button.clone(),
            primary_url: alternative.primary_url.render(target_slug),
            secondary_button,
            secondary_url,
        };
    }

    if let Some(fragment) = path_fragment(url) {
        return AlternativeLink {
            kind: AlternativeKind::Search,
            site_name: alternative.display_name.clone(),
            primary_button: alternative.search_button.clone(),
            primary_url: alternative.search_url.render(&fragment),
            secondary_button: None,
            secondary_url: None,
        };
    }

    AlternativeLink {
        kind: AlternativeKind::Homepage,
        site_name: alternative.display_name.clone(),
        primary_button: alternative.homepage_button.clone(),
        primary_url: alternative.homepage.clone(),
        secondary_button: None,
        secondary_url: None,
    }
}

/// Last path segment that looks like an identifier (`[a-z0-9-]+`), lower-cased.
pub fn path_fragment(url: &str) -> Option<String> {
    let segment = extract_path(url).rsplit('/').find(|segment| !segment.is_empty())?;
    let is_identifier = segment.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if is_identifier {
        Some(segment.to_ascii_lowercase())
    } else {
        None
    }
}

fn coinmarketcap() -> Option<&'static Alternative> {
    PresetCatalog::builtin()
        .list_all()
        .iter()
        .find_map(|preset| preset.alternative("coinmarketcap"))
}

/// Coin slug of a CoinMarketCap currency page.
pub fn extract_cmc_slug(url: &str) -> Option<String> {
    coinmarketcap()?.extract_slug(url)
}

/// CoinGecko coin page for a CoinMarketCap currency URL.
pub fn build_coingecko_url(cmc_url: &str) -> Option<String> {
    let alternative = coinmarketcap()?;
    let slug = alternative.extract_slug(cmc_url)?;
    Some(alternative.primary_url.render(alternative.override_slug(&slug)))
}

/// CoinGecko search page for a free-form query.
pub fn build_coingecko_search_url(query: &str) -> Option<String> {
    Some(coinmarketcap()?.search_url.render(query))
}
