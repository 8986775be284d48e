//! The background service and its message queue.
//!
//! Messages are queued on a channel and handled strictly one at a time by a
//! single worker. Each handler runs to completion on the blocking pool,
//! since every store and runtime call may block on I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use ss_compiler::{compile, install_rules, CompileStats, InstallReport, RuleRuntime};
use ss_store::{PreferenceStore, Preferences};

use crate::error::{Result, ServiceError};
use crate::message::{Message, Response};
use crate::platform::Platform;
use crate::registration::update_content_script_registration;

const QUEUE_CAPACITY: usize = 64;

/// Outcome of a recompilation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecompileReport {
    pub stats: CompileStats,
    pub install: InstallReport,
    /// Next time an allowlist entry expires, if any
    pub next_expiry: Option<i64>,
}

/// Earliest future expiry among allowlist entries.
pub fn next_allowlist_expiry(prefs: &Preferences, now: i64) -> Option<i64> {
    prefs
        .allowlist
        .iter()
        .filter_map(|entry| entry.expires_at)
        .filter(|expires_at| *expires_at > now)
        .min()
}

pub struct BackgroundService {
    store: PreferenceStore,
    runtime: Arc<dyn RuleRuntime>,
    platform: Arc<dyn Platform>,
    extension_id: String,
}

impl BackgroundService {
    pub fn new(
        store: PreferenceStore,
        runtime: Arc<dyn RuleRuntime>,
        platform: Arc<dyn Platform>,
        extension_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            runtime,
            platform,
            extension_id: extension_id.into(),
        }
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    /// First install: compile and install the initial rule set.
    pub fn on_installed(&self) -> Result<RecompileReport> {
        self.recompile()
    }

    /// Full rebuild of the rule set from the current preferences.
    pub fn recompile(&self) -> Result<RecompileReport> {
        let prefs = self.store.read()?;
        let now = self.store.now();
        let compiled = compile(&prefs, self.store.catalog(), &self.extension_id, now)?;
        let stats = compiled.stats;
        let install = install_rules(self.runtime.as_ref(), compiled.rules)?;

        log::info!("Rules updated: {} installed, {} replaced", install.added, install.removed);
        Ok(RecompileReport {
            stats,
            install,
            next_expiry: next_allowlist_expiry(&prefs, now),
        })
    }

    pub fn handle(&self, message: Message) -> Result<Option<RecompileReport>> {
        log::debug!("Handling {:?}", message);
        match message {
            Message::RulesUpdated => self.recompile().map(Some),
            Message::RewritingUpdated => {
                update_content_script_registration(&self.store, self.platform.as_ref())?;
                Ok(None)
            }
            Message::OpenOptions => {
                self.platform.open_options_page()?;
                Ok(None)
            }
        }
    }

    /// Start the worker loop. The loop ends once every handle is dropped.
    pub fn spawn(self) -> (ServiceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(worker_loop(Arc::new(self), rx, tx.downgrade()));
        (ServiceHandle { tx }, worker)
    }
}

struct Envelope {
    message: Message,
    reply: oneshot::Sender<Response>,
}

/// Sending side of the message queue. Cheap to clone.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ServiceHandle {
    /// Queue a message and wait for its acknowledgement.
    pub async fn send(&self, message: Message) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)
    }

    /// Queue a raw `{type: ...}` message as sent by a UI surface.
    pub async fn send_json(&self, json: &str) -> Response {
        match Message::parse(json) {
            Ok(message) => self.send(message).await.unwrap_or_else(Response::failed),
            Err(e) => Response::failed(e),
        }
    }
}

async fn worker_loop(
    service: Arc<BackgroundService>,
    mut rx: mpsc::Receiver<Envelope>,
    weak_tx: mpsc::WeakSender<Envelope>,
) {
    let mut expiry_timer: Option<JoinHandle<()>> = None;

    while let Some(Envelope { message, reply }) = rx.recv().await {
        let worker = Arc::clone(&service);
        let result = tokio::task::spawn_blocking(move || worker.handle(message))
            .await
            .unwrap_or_else(|e| Err(ServiceError::Task(e.to_string())));

        let response = match result {
            Ok(report) => {
                if let Some(report) = report {
                    if let Some(timer) = expiry_timer.take() {
                        timer.abort();
                    }
                    expiry_timer = report
                        .next_expiry
                        .map(|expires_at| schedule_expiry(weak_tx.clone(), expires_at - service.store.now()));
                }
                Response::ok()
            }
            Err(e) => {
                log::error!("{:?} failed: {}", message, e);
                Response::failed(e)
            }
        };

        // The sender may have stopped waiting.
        let _ = reply.send(response);
    }

    if let Some(timer) = expiry_timer {
        timer.abort();
    }
    log::debug!("Background service stopped");
}

/// Queue a recompile once the next allowlist entry has expired, so its allow
/// rule is removed from enforcement.
fn schedule_expiry(weak_tx: mpsc::WeakSender<Envelope>, delay_ms: i64) -> JoinHandle<()> {
    let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(tx) = weak_tx.upgrade() {
            let (reply, _) = oneshot::channel();
            let _ = tx
                .send(Envelope {
                    message: Message::RulesUpdated,
                    reply,
                })
                .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;
    use ss_compiler::InMemoryRuntime;
    use ss_core::{MatchDecision, RequestContext};
    use ss_store::{AllowlistEntry, ManualClock, MemoryStorage};

    fn service() -> (BackgroundService, InMemoryRuntime, Arc<MemoryPlatform>) {
        let store = PreferenceStore::with_clock(MemoryStorage::new(), ManualClock::new(1_000));
        let runtime = InMemoryRuntime::new();
        let platform = Arc::new(MemoryPlatform::new());
        let service = BackgroundService::new(store, Arc::new(runtime.clone()), platform.clone(), "ext-id");
        (service, runtime, platform)
    }

    #[test]
    fn test_next_expiry() {
        let mut prefs = Preferences::default();
        let entry = |domain: &str, expires_at| AllowlistEntry {
            domain: domain.to_string(),
            expires_at,
            created_at: 0,
        };
        prefs.allowlist = vec![entry("a.com", Some(50)), entry("b.com", None), entry("c.com", Some(200))];
        assert_eq!(next_allowlist_expiry(&prefs, 10), Some(50));
        assert_eq!(next_allowlist_expiry(&prefs, 50), Some(200));
        assert_eq!(next_allowlist_expiry(&prefs, 200), None);
    }

    #[test]
    fn test_on_installed_installs_default_rules() {
        let (service, runtime, _) = service();
        let report = service.on_installed().unwrap();
        assert_eq!(report.install.added, 4);
        assert_eq!(report.next_expiry, None);
        let result = runtime.match_request(&RequestContext::main_frame("https://binance.us/"));
        assert_eq!(result.decision, MatchDecision::Redirect);
    }

    #[tokio::test]
    async fn test_queue_acknowledges_each_message() {
        let (service, runtime, platform) = service();
        service.store().set_global_rewriting(true).unwrap();
        let (handle, worker) = service.spawn();

        assert_eq!(handle.send(Message::RulesUpdated).await.unwrap(), Response::ok());
        assert_eq!(runtime.rules().len(), 4);

        assert!(handle.send_json(r#"{"type":"REWRITING_UPDATED"}"#).await.success);
        assert_eq!(platform.registered().len(), 1);

        assert!(handle.send_json(r#"{"type":"OPEN_OPTIONS"}"#).await.success);
        assert_eq!(platform.options_opened(), 1);

        let bad = handle.send_json(r#"{"type":"NOPE"}"#).await;
        assert!(!bad.success);
        assert!(bad.error.is_some());

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_senders_converge() {
        let (service, runtime, _) = service();
        service.store().add_custom_blocked_domain("example.org").unwrap();
        let (handle, worker) = service.spawn();

        let sends: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.send(Message::RulesUpdated).await })
            })
            .collect();
        for send in sends {
            assert!(send.await.unwrap().unwrap().success);
        }
        assert_eq!(runtime.rules().len(), 5);

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_allowlist_entry_is_uninstalled() {
        let clock = ManualClock::new(1_000);
        let store = PreferenceStore::with_clock(MemoryStorage::new(), clock.clone());
        store.add_allowlist_entry("coinmarketcap.com", Some(50)).unwrap();
        let runtime = InMemoryRuntime::new();
        let service = BackgroundService::new(
            store,
            Arc::new(runtime.clone()),
            Arc::new(MemoryPlatform::new()),
            "ext-id",
        );
        let (handle, worker) = service.spawn();

        handle.send(Message::RulesUpdated).await.unwrap();
        assert_eq!(runtime.rules().len(), 5);
        let navigation = RequestContext::main_frame("https://coinmarketcap.com/");
        assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Allow);

        // No further message is sent; the timer queues the recompile.
        clock.advance(50);
        let mut waited_ms = 0;
        while runtime.rules().len() != 4 && waited_ms < 2_000 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited_ms += 20;
        }
        assert_eq!(runtime.rules().len(), 4);
        assert_eq!(runtime.match_request(&navigation).decision, MatchDecision::Redirect);

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_service() {
        let (service, _, _) = service();
        let (handle, worker) = service.spawn();
        worker.abort();
        let _ = worker.await;
        assert!(matches!(handle.send(Message::RulesUpdated).await, Err(ServiceError::Closed)));
    }
}
