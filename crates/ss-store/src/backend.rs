//! Storage backends.
//!
//! A storage area is a flat JSON key/value object with top-level merge
//! writes, the same model as the browser's extension storage. The store
//! keeps the whole preference record in one area.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Persistent key/value storage with last-writer-wins top-level merges.
pub trait StorageArea: Send + Sync {
    /// Every stored key.
    fn get_all(&self) -> Result<Map<String, Value>>;

    /// Merge `items` into the stored object, replacing whole values per key.
    fn set(&self, items: Map<String, Value>) -> Result<()>;

    /// Remove the given keys. Missing keys are ignored.
    fn remove(&self, keys: &[String]) -> Result<()>;

    /// Remove every key.
    fn clear(&self) -> Result<()>;
}

/// In-memory storage area. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<Map<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with raw items, e.g. a record from an older version.
    pub fn with_items(items: Map<String, Value>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageArea for MemoryStorage {
    fn get_all(&self) -> Result<Map<String, Value>> {
        Ok(self.lock().clone())
    }

    fn set(&self, items: Map<String, Value>) -> Result<()> {
        self.lock().extend(items);
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        let mut items = self.lock();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

/// Storage area backed by a single JSON file.
///
/// The file is re-read on every access so several handles on the same path
/// observe each other's writes. Writes go through a temporary file and a
/// rename so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(map)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl StorageArea for JsonFileStorage {
    fn get_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Backend(format!(
                "'{}' does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    fn set(&self, items: Map<String, Value>) -> Result<()> {
        let mut map = self.get_all()?;
        map.extend(items);
        self.write_map(&map)
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        let mut map = self.get_all()?;
        let before = map.len();
        for key in keys {
            map.remove(key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.write_map(&map)
    }

    fn clear(&self) -> Result<()> {
        self.write_map(&Map::new())
    }
}
