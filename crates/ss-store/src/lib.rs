//! SourceSwitch Preference Store
//!
//! A single versioned record holding preset toggles, flags, the allowlist,
//! custom block lists, rewrite exceptions and a bounded event log.
//!
//! # Modules
//!
//! - `schema`: The stored record and its partial-update patch
//! - `backend`: Storage areas (memory, JSON file)
//! - `clock`: Time sources for expiry and event timestamps
//! - `store`: Accessors, migration-on-read and export
//! - `import`: Sanitizing import of untrusted backups

pub mod backend;
pub mod clock;
pub mod error;
pub mod import;
pub mod schema;
pub mod store;

pub use backend::{JsonFileStorage, MemoryStorage, StorageArea};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, StoreError};
pub use import::sanitize_import;
pub use schema::{
    AllowlistEntry, CustomApiEntry, CustomBlockEntry, EventKind, EventLogEntry, Language, PresetState, Preferences,
    PreferencesPatch, MAX_EVENTS, STATS_WINDOW_MS, STORAGE_VERSION,
};
pub use store::{EventStats, PreferenceStore};
