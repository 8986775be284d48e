//! Blocked page -> bypass -> navigation, through the message queue.

use std::sync::Arc;

use ss_background::{BackgroundService, Bypass, InterstitialController, MemoryPlatform, ServiceError};
use ss_compiler::{interstitial_url, InMemoryRuntime, RuleRuntime, RuleUpdate, RuntimeError};
use ss_core::{MatchDecision, RequestContext, Rule};
use ss_store::{EventKind, ManualClock, MemoryStorage, PreferenceStore};

const EXT: &str = "sourceswitch-test";

fn setup() -> (PreferenceStore, ManualClock, InMemoryRuntime, BackgroundService) {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = PreferenceStore::with_clock(MemoryStorage::new(), clock.clone());
    let runtime = InMemoryRuntime::new();
    let service = BackgroundService::new(
        store.clone(),
        Arc::new(runtime.clone()),
        Arc::new(MemoryPlatform::new()),
        EXT,
    );
    (store, clock, runtime, service)
}

fn query_of(url: &str) -> &str {
    url.find('?').map_or("", |pos| &url[pos..])
}

#[tokio::test]
async fn allow_once_then_block_again() {
    let (store, clock, runtime, service) = setup();
    service.on_installed().unwrap();
    let (handle, worker) = service.spawn();

    let navigation = RequestContext::main_frame("https://coinmarketcap.com/");
    let redirect = runtime.match_request(&navigation);
    assert_eq!(redirect.decision, MatchDecision::Redirect);
    let redirect_url = redirect.redirect_url.unwrap();
    assert_eq!(redirect_url, interstitial_url(EXT, "coinmarketcap.com"));

    let page = InterstitialController::new(store.clone(), handle.clone(), query_of(&redirect_url));
    page.on_load().unwrap();
    let target = page.allow(Bypass::Once).await.unwrap();
    assert_eq!(target, "https://coinmarketcap.com/");

    clock.advance(2_000);
    assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Allow);

    clock.advance(3_000);
    assert!(!store.is_domain_allowed("coinmarketcap.com").unwrap());
    handle.send(ss_background::Message::RulesUpdated).await.unwrap();
    assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Redirect);

    let kinds: Vec<EventKind> = store.events(None).unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::BlockedNavigation, EventKind::BypassGranted]);

    drop(page);
    drop(handle);
    worker.await.unwrap();
}

#[tokio::test]
async fn allow_temporarily_lasts_ten_minutes() {
    let (store, clock, runtime, service) = setup();
    let (handle, worker) = service.spawn();

    let page = InterstitialController::new(store.clone(), handle.clone(), "?blocked=binance.com");
    page.allow(Bypass::Temporarily).await.unwrap();

    let navigation = RequestContext::main_frame("https://www.binance.com/en/trade");
    clock.advance(9 * 60 * 1000);
    assert!(store.is_domain_allowed("www.binance.com").unwrap());
    assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Allow);

    clock.advance(60 * 1000);
    handle.send(ss_background::Message::RulesUpdated).await.unwrap();
    assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Redirect);

    drop(page);
    drop(handle);
    worker.await.unwrap();
}

#[tokio::test]
async fn bypass_refused_without_captured_url() {
    let (store, _, _, service) = setup();
    let (handle, worker) = service.spawn();

    let page = InterstitialController::new(store.clone(), handle.clone(), "");
    page.on_load().unwrap();
    assert!(matches!(page.allow(Bypass::Once).await, Err(ServiceError::BypassUnavailable)));
    assert!(store.allowlist().unwrap().is_empty());
    assert!(store.events(None).unwrap().is_empty());

    drop(page);
    drop(handle);
    worker.await.unwrap();
}

/// Accepts nothing.
struct RejectingRuntime;

impl RuleRuntime for RejectingRuntime {
    fn dynamic_rules(&self) -> Result<Vec<Rule>, RuntimeError> {
        Ok(Vec::new())
    }

    fn update_dynamic_rules(&self, _update: RuleUpdate) -> Result<(), RuntimeError> {
        Err(RuntimeError::Rejected("rule quota exceeded".to_string()))
    }
}

#[tokio::test]
async fn bypass_reports_failed_rule_update() {
    let store = PreferenceStore::with_clock(MemoryStorage::new(), ManualClock::new(0));
    let service = BackgroundService::new(
        store.clone(),
        Arc::new(RejectingRuntime),
        Arc::new(MemoryPlatform::new()),
        EXT,
    );
    let (handle, worker) = service.spawn();

    let page = InterstitialController::new(store.clone(), handle.clone(), "?blocked=binance.com");
    match page.allow(Bypass::Once).await {
        Err(ServiceError::RulesNotUpdated(message)) => assert!(message.contains("rule quota exceeded")),
        other => panic!("expected RulesNotUpdated, got {:?}", other),
    }
    // The entry is kept for the next successful recompile.
    assert!(store.is_domain_allowed("binance.com").unwrap());

    drop(page);
    drop(handle);
    worker.await.unwrap();
}
