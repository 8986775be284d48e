//! Browser APIs the background service drives, other than rule enforcement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAt {
    DocumentStart,
    DocumentEnd,
    DocumentIdle,
}

/// A dynamically registered content script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentScript {
    pub id: String,
    pub matches: Vec<String>,
    pub exclude_matches: Vec<String>,
    pub js: Vec<String>,
    pub run_at: RunAt,
}

pub trait Platform: Send + Sync {
    fn register_content_scripts(&self, scripts: Vec<ContentScript>) -> Result<(), PlatformError>;

    /// Fails when any id is not registered.
    fn unregister_content_scripts(&self, ids: &[&str]) -> Result<(), PlatformError>;

    fn open_options_page(&self) -> Result<(), PlatformError>;
}

/// Platform double that keeps registrations in memory.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    scripts: Mutex<Vec<ContentScript>>,
    options_opened: AtomicUsize,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ContentScript>> {
        self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn registered(&self) -> Vec<ContentScript> {
        self.lock().clone()
    }

    pub fn options_opened(&self) -> usize {
        self.options_opened.load(Ordering::SeqCst)
    }
}

impl Platform for MemoryPlatform {
    fn register_content_scripts(&self, scripts: Vec<ContentScript>) -> Result<(), PlatformError> {
        let mut registered = self.lock();
        for script in &scripts {
            if registered.iter().any(|existing| existing.id == script.id) {
                return Err(PlatformError(format!("Duplicate script ID '{}'", script.id)));
            }
        }
        registered.extend(scripts);
        Ok(())
    }

    fn unregister_content_scripts(&self, ids: &[&str]) -> Result<(), PlatformError> {
        let mut registered = self.lock();
        if let Some(missing) = ids.iter().find(|id| !registered.iter().any(|script| script.id == **id)) {
            return Err(PlatformError(format!("Nonexistent script ID '{}'", missing)));
        }
        registered.retain(|script| !ids.contains(&script.id.as_str()));
        Ok(())
    }

    fn open_options_page(&self) -> Result<(), PlatformError> {
        self.options_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
