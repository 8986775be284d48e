//! SourceSwitch CLI
//!
//! CLI tool for compiling rule sets and managing a preference file.

use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ss_background::{LinkRewriter, RewriterSettings};
use ss_compiler::{compile, install_rules, InMemoryRuntime, RuleClass};
use ss_core::{resolve_alternative, MatchDecision, MatchResult, RequestContext, ResourceType};
use ss_store::{JsonFileStorage, Language, PreferenceStore, STATS_WINDOW_MS};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "ss-cli")]
#[command(about = "SourceSwitch rule compiler and preference tools")]
struct Cli {
    /// Preference file
    #[arg(long, global = true, default_value = "sourceswitch.json")]
    prefs: PathBuf,

    /// Extension id used in interstitial redirect URLs
    #[arg(long, global = true, default_value = "sourceswitch-dev")]
    extension_id: String,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the preferences into declarative rules
    Compile {
        /// Write the rules JSON here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Evaluate a request against the compiled rules
    Check {
        url: String,

        /// Resource type of the request (browser name or alias such as xhr, js)
        #[arg(short = 't', long = "type", default_value = "main_frame")]
        request_type: String,
    },

    /// Print the current preferences
    Show,

    /// Allowlist a domain
    Allow {
        domain: String,

        /// Expire after this many minutes (default: permanent)
        #[arg(short, long)]
        minutes: Option<i64>,
    },

    /// Remove a domain from the allowlist
    Disallow { domain: String },

    /// Block a custom domain
    Block { domain: String },

    /// Remove a custom blocked domain
    Unblock { domain: String },

    /// Block a custom API endpoint in strict mode
    BlockApi { endpoint: String },

    /// Remove a custom API endpoint
    UnblockApi { endpoint: String },

    /// Exclude a site from link rewriting
    Exempt { domain: String },

    /// Remove a rewrite exception
    Unexempt { domain: String },

    /// Change a setting
    Set {
        #[arg(value_enum)]
        setting: Setting,
        value: String,
    },

    /// List presets, or enable/disable one
    Preset {
        id: Option<String>,

        #[arg(value_enum)]
        state: Option<Switch>,
    },

    /// Export preferences as JSON
    Export {
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Import preferences from a backup file
    Import {
        #[arg(short, long)]
        input: String,
    },

    /// List logged events
    Events {
        /// Only events at or after this timestamp (ms)
        #[arg(long)]
        since: Option<i64>,

        /// Clear the event log instead
        #[arg(long)]
        clear: bool,
    },

    /// Event statistics
    Stats {
        /// Window in days (default: 7)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Show the alternative for a URL
    Alternative { url: String },

    /// Rewrite links as they would be on a page
    Rewrite {
        /// Host of the page the links are on
        #[arg(long)]
        page: String,

        hrefs: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Setting {
    StrictMode,
    Rewriting,
    Notifications,
    Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = PreferenceStore::new(JsonFileStorage::new(&cli.prefs));
    let ext = cli.extension_id.as_str();

    let result = match cli.command {
        Commands::Compile { output } => cmd_compile(&store, ext, output.as_deref()),
        Commands::Check { url, request_type } => cmd_check(&store, ext, &url, &request_type),
        Commands::Show => cmd_show(&store),
        Commands::Allow { domain, minutes } => cmd_allow(&store, &domain, minutes),
        Commands::Disallow { domain } => cmd_disallow(&store, &domain),
        Commands::Block { domain } => cmd_block(&store, &domain),
        Commands::Unblock { domain } => cmd_unblock(&store, &domain),
        Commands::BlockApi { endpoint } => cmd_block_api(&store, &endpoint),
        Commands::UnblockApi { endpoint } => cmd_unblock_api(&store, &endpoint),
        Commands::Exempt { domain } => cmd_exempt(&store, &domain),
        Commands::Unexempt { domain } => cmd_unexempt(&store, &domain),
        Commands::Set { setting, value } => cmd_set(&store, setting, &value),
        Commands::Preset { id, state } => cmd_preset(&store, id.as_deref(), state),
        Commands::Export { output } => cmd_export(&store, output.as_deref()),
        Commands::Import { input } => cmd_import(&store, &input),
        Commands::Events { since, clear } => cmd_events(&store, since, clear),
        Commands::Stats { days } => cmd_stats(&store, days),
        Commands::Alternative { url } => cmd_alternative(&store, &url),
        Commands::Rewrite { page, hrefs } => cmd_rewrite(&store, &page, &hrefs),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn fail(e: impl Display) -> String {
    e.to_string()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("Expected on/off, got '{}'", value)),
    }
}

// ============================================================================
// Rules
// ============================================================================

fn cmd_compile(store: &PreferenceStore, extension_id: &str, output: Option<&str>) -> Result<(), String> {
    let prefs = store.read().map_err(fail)?;
    let compiled = compile(&prefs, store.catalog(), extension_id, store.now()).map_err(fail)?;
    let json = compiled.to_json().map_err(fail)?;

    let stats = compiled.stats;
    eprintln!("Compiled {} rules", stats.total());
    for class in RuleClass::ALL {
        eprintln!("  {:<18}{}", format!("{}:", class), stats.count(class));
    }
    eprintln!("  {:<18}{}", "deduped:", stats.deduped);

    match output {
        Some(path) => {
            fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            eprintln!("Wrote '{}'", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Compile, install into a fresh runtime and match one request.
fn evaluate(store: &PreferenceStore, extension_id: &str, url: &str, request_type: &str) -> Result<MatchResult, String> {
    let request_type =
        ResourceType::from_alias(request_type).ok_or_else(|| format!("Unknown resource type '{}'", request_type))?;
    let prefs = store.read().map_err(fail)?;
    let compiled = compile(&prefs, store.catalog(), extension_id, store.now()).map_err(fail)?;

    let runtime = InMemoryRuntime::new();
    install_rules(&runtime, compiled.rules).map_err(fail)?;
    Ok(runtime.match_request(&RequestContext { url, request_type }))
}

fn cmd_check(store: &PreferenceStore, extension_id: &str, url: &str, request_type: &str) -> Result<(), String> {
    let result = evaluate(store, extension_id, url, request_type)?;
    let rule = result
        .rule_id
        .map(|id| match RuleClass::of(id) {
            Some(class) => format!(" (rule {}, {})", id, class),
            None => format!(" (rule {})", id),
        })
        .unwrap_or_default();

    match result.decision {
        MatchDecision::Allow => println!("ALLOW{}", rule),
        MatchDecision::Block => println!("BLOCK{}", rule),
        MatchDecision::Redirect => println!(
            "REDIRECT{} -> {}",
            rule,
            result.redirect_url.as_deref().unwrap_or_default()
        ),
    }
    Ok(())
}

// ============================================================================
// Preferences
// ============================================================================

fn cmd_show(store: &PreferenceStore) -> Result<(), String> {
    let prefs = store.read().map_err(fail)?;
    let now = store.now();

    println!("Strict mode:           {}", on_off(prefs.strict_mode));
    println!("Link rewriting:        {}", on_off(prefs.global_rewriting));
    println!("Rewrite notifications: {}", on_off(prefs.show_rewrite_notifications));
    println!("Language:              {:?}", prefs.language);

    println!("Allowlist:");
    for entry in prefs.active_allowlist(now) {
        match entry.expires_at {
            Some(expires_at) => println!("  {} (expires in {}s)", entry.domain, (expires_at - now) / 1000),
            None => println!("  {}", entry.domain),
        }
    }
    println!("Custom blocked domains:");
    for entry in &prefs.custom_blocked_domains {
        println!("  {}", entry.domain);
    }
    println!("Custom blocked APIs:");
    for entry in &prefs.custom_blocked_apis {
        println!("  {}", entry.endpoint);
    }
    println!("Rewrite exceptions:");
    for domain in &prefs.rewrite_exceptions {
        println!("  {}", domain);
    }
    Ok(())
}

fn cmd_allow(store: &PreferenceStore, domain: &str, minutes: Option<i64>) -> Result<(), String> {
    if minutes.is_some_and(|m| m <= 0) {
        return Err("--minutes must be positive".to_string());
    }
    let entry = store
        .add_allowlist_entry(domain, minutes.map(|m| m.saturating_mul(60_000)))
        .map_err(fail)?;
    match minutes {
        Some(m) => println!("Allowed {} for {} minutes", entry.domain, m),
        None => println!("Allowed {}", entry.domain),
    }
    Ok(())
}

fn cmd_disallow(store: &PreferenceStore, domain: &str) -> Result<(), String> {
    if store.remove_allowlist_entry(domain).map_err(fail)? {
        println!("Removed {} from the allowlist", domain);
    } else {
        println!("{} is not on the allowlist", domain);
    }
    Ok(())
}

fn cmd_block(store: &PreferenceStore, domain: &str) -> Result<(), String> {
    if store.add_custom_blocked_domain(domain).map_err(fail)? {
        println!("Blocked {}", domain);
    } else {
        println!("{} is already blocked", domain);
    }
    Ok(())
}

fn cmd_unblock(store: &PreferenceStore, domain: &str) -> Result<(), String> {
    if store.remove_custom_blocked_domain(domain).map_err(fail)? {
        println!("Unblocked {}", domain);
    } else {
        println!("{} is not a custom blocked domain", domain);
    }
    Ok(())
}

fn cmd_block_api(store: &PreferenceStore, endpoint: &str) -> Result<(), String> {
    if store.add_custom_blocked_api(endpoint).map_err(fail)? {
        println!("Blocked API {}", endpoint);
        if !store.strict_mode().map_err(fail)? {
            println!("  (enforced only in strict mode)");
        }
    } else {
        println!("{} is already blocked", endpoint);
    }
    Ok(())
}

fn cmd_unblock_api(store: &PreferenceStore, endpoint: &str) -> Result<(), String> {
    if store.remove_custom_blocked_api(endpoint).map_err(fail)? {
        println!("Unblocked API {}", endpoint);
    } else {
        println!("{} is not a custom blocked API", endpoint);
    }
    Ok(())
}

fn cmd_exempt(store: &PreferenceStore, domain: &str) -> Result<(), String> {
    if store.add_rewrite_exception(domain).map_err(fail)? {
        println!("Links on {} will not be rewritten", domain);
    } else {
        println!("{} is already a rewrite exception", domain);
    }
    Ok(())
}

fn cmd_unexempt(store: &PreferenceStore, domain: &str) -> Result<(), String> {
    if store.remove_rewrite_exception(domain).map_err(fail)? {
        println!("Removed rewrite exception {}", domain);
    } else {
        println!("{} is not a rewrite exception", domain);
    }
    Ok(())
}

fn cmd_set(store: &PreferenceStore, setting: Setting, value: &str) -> Result<(), String> {
    match setting {
        Setting::StrictMode => store.set_strict_mode(parse_switch(value)?),
        Setting::Rewriting => store.set_global_rewriting(parse_switch(value)?),
        Setting::Notifications => store.set_show_rewrite_notifications(parse_switch(value)?),
        Setting::Language => {
            let language =
                Language::parse(value).ok_or_else(|| format!("Unknown language '{}' (system, en, tr)", value))?;
            store.set_language(language)
        }
    }
    .map_err(fail)?;
    println!("{:?} = {}", setting, value);
    Ok(())
}

fn cmd_preset(store: &PreferenceStore, id: Option<&str>, state: Option<Switch>) -> Result<(), String> {
    match (id, state) {
        (Some(id), Some(state)) => {
            store.set_preset_enabled(id, state == Switch::On).map_err(fail)?;
            println!("{} = {}", id, on_off(state == Switch::On));
        }
        (Some(id), None) => {
            let preset = store
                .catalog()
                .get(id)
                .ok_or_else(|| format!("Unknown preset '{}'", id))?;
            let enabled = store.read().map_err(fail)?.preset_enabled(id);
            println!("{} ({}): {}", preset.display_name, preset.id, on_off(enabled));
            for domain in &preset.domains {
                println!("  domain   {}", domain.pattern);
            }
            for endpoint in &preset.api_endpoints {
                println!("  api      {}", endpoint);
            }
        }
        (None, _) => {
            let prefs = store.read().map_err(fail)?;
            for preset in store.catalog().list_all() {
                println!(
                    "{:<28}{:<4}{}",
                    preset.id,
                    on_off(prefs.preset_enabled(&preset.id)),
                    preset.display_name
                );
            }
        }
    }
    Ok(())
}

// ============================================================================
// Backup
// ============================================================================

fn cmd_export(store: &PreferenceStore, output: Option<&str>) -> Result<(), String> {
    let json = store.export_data().map_err(fail)?;
    match output {
        Some(path) => {
            fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            println!("Exported preferences to '{}'", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_import(store: &PreferenceStore, input: &str) -> Result<(), String> {
    let json = fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    let prefs = store.import_data(&json).map_err(fail)?;
    println!("Imported '{}'", input);
    println!("  Allowlist:      {}", prefs.allowlist.len());
    println!("  Custom domains: {}", prefs.custom_blocked_domains.len());
    println!("  Custom APIs:    {}", prefs.custom_blocked_apis.len());
    println!("  Exceptions:     {}", prefs.rewrite_exceptions.len());
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

fn cmd_events(store: &PreferenceStore, since: Option<i64>, clear: bool) -> Result<(), String> {
    if clear {
        store.clear_events().map_err(fail)?;
        println!("Cleared event log");
        return Ok(());
    }
    for event in store.events(since).map_err(fail)? {
        println!(
            "{:>14}  {:<18}{:<24}{}",
            event.timestamp,
            format!("{:?}", event.kind),
            event.domain,
            event.url
        );
    }
    Ok(())
}

fn cmd_stats(store: &PreferenceStore, days: Option<i64>) -> Result<(), String> {
    let window = match days {
        Some(days) if days <= 0 => return Err("--days must be positive".to_string()),
        Some(days) => days.saturating_mul(DAY_MS),
        None => STATS_WINDOW_MS,
    };
    let stats = store.event_stats(store.now() - window).map_err(fail)?;
    println!("Last {} days", window / DAY_MS);
    println!("  Blocked navigations: {}", stats.blocked_navigations);
    println!("  Bypasses granted:    {}", stats.bypasses_granted);
    println!("  Links rewritten:     {}", stats.links_rewritten);
    println!("  API requests:        {}", stats.api_blocked);
    Ok(())
}

// ============================================================================
// Alternatives
// ============================================================================

fn cmd_alternative(store: &PreferenceStore, url: &str) -> Result<(), String> {
    let link = resolve_alternative(store.catalog(), url).ok_or_else(|| format!("No alternative for '{}'", url))?;
    println!("{} ({:?})", link.site_name, link.kind);
    println!("  {}: {}", link.primary_button, link.primary_url);
    if let (Some(button), Some(url)) = (&link.secondary_button, &link.secondary_url) {
        println!("  {}: {}", button, url);
    }
    Ok(())
}

fn cmd_rewrite(store: &PreferenceStore, page: &str, hrefs: &[String]) -> Result<(), String> {
    let mut rewriter = LinkRewriter::new(store.catalog(), page, RewriterSettings::load(store));
    if rewriter.is_excluded() {
        println!("{} is a rewrite exception, links left unchanged", page);
        return Ok(());
    }

    let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
    let records = rewriter.process(&hrefs, store);
    for record in records {
        println!("  {} -> {}", record.original, record.rewritten);
    }
    println!("Rewrote {} of {} links", records.len(), hrefs.len());
    if rewriter.should_notify() {
        log::info!("Rewrite notification would be shown on {}", page);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ss_store::{EventKind, ManualClock, MemoryStorage};

    const EXT: &str = "ext-id";

    fn store() -> PreferenceStore {
        PreferenceStore::with_clock(MemoryStorage::new(), ManualClock::new(1_700_000_000_000))
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from([
            "ss-cli",
            "--prefs",
            "prefs.json",
            "check",
            "https://api.binance.com/",
            "--type",
            "xmlhttprequest",
        ])
        .unwrap();
        assert_eq!(cli.prefs, PathBuf::from("prefs.json"));
        assert_eq!(cli.extension_id, "sourceswitch-dev");
        assert!(matches!(cli.command, Commands::Check { ref request_type, .. } if request_type == "xmlhttprequest"));
    }

    #[test]
    fn test_default_block_and_allow() {
        let store = store();
        let result = evaluate(&store, EXT, "https://coinmarketcap.com/", "main_frame").unwrap();
        assert_eq!(result.decision, MatchDecision::Redirect);
        assert_eq!(
            result.redirect_url.as_deref(),
            Some("chrome-extension://ext-id/pages/blocked/blocked.html?blocked=coinmarketcap.com")
        );

        cmd_allow(&store, "coinmarketcap.com", Some(10)).unwrap();
        let result = evaluate(&store, EXT, "https://coinmarketcap.com/", "main_frame").unwrap();
        assert_eq!(result.decision, MatchDecision::Allow);

        cmd_disallow(&store, "coinmarketcap.com").unwrap();
        let result = evaluate(&store, EXT, "https://coinmarketcap.com/", "main_frame").unwrap();
        assert_eq!(result.decision, MatchDecision::Redirect);
    }

    #[test]
    fn test_strict_mode_setting() {
        let store = store();
        cmd_block_api(&store, "api.example.org/v2").unwrap();
        let api = "https://api.example.org/v2/prices";
        assert_eq!(
            evaluate(&store, EXT, api, "xmlhttprequest").unwrap().decision,
            MatchDecision::Allow
        );

        cmd_set(&store, Setting::StrictMode, "on").unwrap();
        assert_eq!(
            evaluate(&store, EXT, api, "xmlhttprequest").unwrap().decision,
            MatchDecision::Block
        );
        // Navigations are left to the redirect rules.
        assert_eq!(evaluate(&store, EXT, api, "main_frame").unwrap().decision, MatchDecision::Allow);

        cmd_preset(&store, Some("preset_binance_ecosystem"), Some(Switch::Off)).unwrap();
        assert_eq!(
            evaluate(&store, EXT, "https://api.binance.com/api/v3/ticker", "js")
                .unwrap()
                .decision,
            MatchDecision::Allow
        );
    }

    #[test]
    fn test_invalid_input() {
        let store = store();
        assert!(evaluate(&store, EXT, "https://example.com/", "teapot").is_err());
        assert!(cmd_set(&store, Setting::Language, "fr").is_err());
        assert!(cmd_set(&store, Setting::StrictMode, "maybe").is_err());
        assert!(cmd_block(&store, "<script>").is_err());
        assert!(cmd_allow(&store, "example.com", Some(0)).is_err());
        assert!(cmd_preset(&store, Some("preset_nope"), Some(Switch::On)).is_err());
        assert!(cmd_stats(&store, Some(-1)).is_err());
        assert!(cmd_import(&store, "/nonexistent/backup.json").is_err());
        assert!(cmd_alternative(&store, "https://example.com/").is_err());
    }

    #[test]
    fn test_settings() {
        let store = store();
        cmd_set(&store, Setting::Language, "tr").unwrap();
        cmd_set(&store, Setting::Rewriting, "on").unwrap();
        cmd_set(&store, Setting::Notifications, "off").unwrap();
        assert_eq!(store.language().unwrap(), Language::Tr);
        assert!(store.global_rewriting().unwrap());
        assert!(!store.show_rewrite_notifications().unwrap());
    }

    #[test]
    fn test_rewrite_logs_events() {
        let store = store();
        cmd_rewrite(
            &store,
            "news.example.com",
            &[
                "https://coinmarketcap.com/currencies/bitcoin/".to_string(),
                "https://example.com/".to_string(),
            ],
        )
        .unwrap();
        let events = store.events(None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::LinkRewritten);

        cmd_exempt(&store, "example.com").unwrap();
        cmd_rewrite(
            &store,
            "news.example.com",
            &["https://coinmarketcap.com/currencies/bitcoin/".to_string()],
        )
        .unwrap();
        assert_eq!(store.events(None).unwrap().len(), 1);

        cmd_events(&store, None, true).unwrap();
        assert!(store.events(None).unwrap().is_empty());
    }
}
