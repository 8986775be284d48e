//! Preset Catalog
//!
//! A static, read-only table of presets. Each preset bundles the domains it
//! blocks, the API endpoints blocked in strict mode and optional alternative
//! sites that blocked links can be rewritten to. The built-in catalog is
//! constructed once and shared by reference; adding a preset is a data change.

use std::sync::OnceLock;

use regex::Regex;

use crate::url::{encode_component, is_domain_or_subdomain};

/// Domains redirected to the interstitial regardless of preset state.
pub const DEFAULT_BLOCKED_DOMAINS: [&str; 4] = [
    "binance.com",
    "binance.us",
    "coinmarketcap.com",
    "trustwallet.com",
];

/// A domain pattern: `example.com` or `*.example.com`.
#[derive(Debug, Clone)]
pub struct DomainPattern {
    pub pattern: String,
    /// Display name of the site this pattern belongs to
    pub site_name: String,
}

impl DomainPattern {
    fn new(pattern: &str, site_name: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            site_name: site_name.to_string(),
        }
    }

    /// Domain without a leading `*.` wildcard.
    pub fn base_domain(&self) -> &str {
        self.pattern.strip_prefix("*.").unwrap_or(&self.pattern)
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern.starts_with("*.")
    }

    /// Whether a host is covered by this pattern.
    pub fn matches_host(&self, host: &str) -> bool {
        let base = self.base_domain();
        if self.is_wildcard() {
            is_domain_or_subdomain(host, base) && !host.eq_ignore_ascii_case(base)
        } else {
            host.eq_ignore_ascii_case(base)
        }
    }

    /// Content-script match pattern excluding this domain, e.g. `*://*.example.com/*`.
    pub fn exclude_match(&self) -> String {
        format!("*://{}/*", self.pattern)
    }
}

/// URL built from a slug by substituting `{slug}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: &str) -> Self {
        Self(template.to_string())
    }

    pub fn render(&self, slug: &str) -> String {
        self.0.replace("{slug}", &encode_component(slug))
    }
}

/// An alternative site offered in place of a blocked one.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub key: String,
    /// Domain whose links this alternative replaces
    pub source_domain: String,
    pub primary_button: String,
    pub primary_url: UrlTemplate,
    pub secondary_button: Option<String>,
    pub secondary_url: Option<UrlTemplate>,
    /// Captures the slug in group 1
    pub slug_extractor: Option<Regex>,
    /// Generic search on the alternative site
    pub search_button: String,
    pub search_url: UrlTemplate,
    pub homepage_button: String,
    pub homepage: String,
    pub display_name: String,
    /// Source slug -> target slug, for ids that differ between the sites
    pub slug_overrides: Vec<(String, String)>,
}

impl Alternative {
    pub fn extract_slug(&self, url: &str) -> Option<String> {
        let captures = self.slug_extractor.as_ref()?.captures(url)?;
        Some(captures.get(1)?.as_str().to_ascii_lowercase())
    }

    pub fn override_slug<'a>(&'a self, slug: &'a str) -> &'a str {
        self.slug_overrides
            .iter()
            .find(|(from, _)| from == slug)
            .map_or(slug, |(_, to)| to.as_str())
    }

    pub fn covers_host(&self, host: &str) -> bool {
        is_domain_or_subdomain(host, &self.source_domain)
    }
}

/// A named bundle of block patterns.
#[derive(Debug, Clone)]
pub struct Preset {
    pub id: String,
    pub display_name: String,
    /// Enable flag written into fresh preferences
    pub enabled_by_default: bool,
    pub domains: Vec<DomainPattern>,
    pub api_endpoints: Vec<String>,
    pub alternatives: Vec<Alternative>,
}

impl Preset {
    pub fn alternative(&self, key: &str) -> Option<&Alternative> {
        self.alternatives.iter().find(|alt| alt.key == key)
    }
}

/// Immutable preset lookup table. Iteration order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

static BUILTIN: OnceLock<PresetCatalog> = OnceLock::new();

impl PresetCatalog {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    /// The catalog compiled into the extension.
    pub fn builtin() -> &'static PresetCatalog {
        BUILTIN.get_or_init(|| PresetCatalog::new(vec![binance_ecosystem()]))
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn list_all(&self) -> &[Preset] {
        &self.presets
    }

    pub fn list_ids(&self) -> Vec<&str> {
        self.presets.iter().map(|preset| preset.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Every domain pattern of every preset, in catalog order.
    pub fn domain_patterns(&self) -> impl Iterator<Item = &DomainPattern> {
        self.presets.iter().flat_map(|preset| preset.domains.iter())
    }

    /// The first alternative whose source domain covers `host`.
    pub fn alternative_for_host(&self, host: &str) -> Option<&Alternative> {
        self.presets
            .iter()
            .flat_map(|preset| preset.alternatives.iter())
            .find(|alt| alt.covers_host(host))
    }

    /// Display name of the blocked site a host belongs to.
    pub fn site_name_for_host(&self, host: &str) -> Option<&str> {
        self.domain_patterns()
            .find(|domain| domain.matches_host(host))
            .map(|domain| domain.site_name.as_str())
    }
}

fn binance_ecosystem() -> Preset {
    Preset {
        id: "preset_binance_ecosystem".to_string(),
        display_name: "Binance ecosystem".to_string(),
        enabled_by_default: true,
        domains: vec![
            DomainPattern::new("binance.com", "Binance"),
            DomainPattern::new("*.binance.com", "Binance"),
            DomainPattern::new("binance.us", "Binance"),
            DomainPattern::new("*.binance.us", "Binance"),
            DomainPattern::new("coinmarketcap.com", "CoinMarketCap"),
            DomainPattern::new("*.coinmarketcap.com", "CoinMarketCap"),
            DomainPattern::new("trustwallet.com", "Trust Wallet"),
            DomainPattern::new("*.trustwallet.com", "Trust Wallet"),
        ],
        api_endpoints: [
            "api.binance.com",
            "api1.binance.com",
            "api2.binance.com",
            "api3.binance.com",
            "data-api.binance.vision",
            "api.binance.us",
            "pro-api.coinmarketcap.com",
            "api.coinmarketcap.com",
            "static.coinmarketcap.com",
            "files.coinmarketcap.com",
        ]
        .iter()
        .map(|endpoint| endpoint.to_string())
        .collect(),
        alternatives: vec![Alternative {
            key: "coinmarketcap".to_string(),
            source_domain: "coinmarketcap.com".to_string(),
            primary_button: "Open on CoinGecko".to_string(),
            primary_url: UrlTemplate::new("https://www.coingecko.com/en/coins/{slug}"),
            secondary_button: Some("Search on CoinGecko".to_string()),
            secondary_url: Some(UrlTemplate::new("https://www.coingecko.com/en/search?query={slug}")),
            slug_extractor: Regex::new(r"(?i)coinmarketcap\.com/currencies/([a-z0-9-]+)").ok(),
            search_button: "Search on CoinGecko".to_string(),
            search_url: UrlTemplate::new("https://www.coingecko.com/en/search?query={slug}"),
            homepage_button: "Go to CoinGecko".to_string(),
            homepage: "https://www.coingecko.com".to_string(),
            display_name: "CoinGecko".to_string(),
            slug_overrides: [
                ("binancecoin", "binancecoin"),
                ("bitcoin", "bitcoin"),
                ("ethereum", "ethereum"),
                ("solana", "solana"),
            ]
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
        }],
    }
}
