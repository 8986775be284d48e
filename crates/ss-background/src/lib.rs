//! SourceSwitch Background Service
//!
//! Message-driven glue between the UI surfaces, the preference store and
//! the enforcement runtime.
//!
//! # Modules
//!
//! - `message`: `RULES_UPDATED` / `REWRITING_UPDATED` / `OPEN_OPTIONS` and their acknowledgement
//! - `service`: Recompilation and the one-at-a-time message queue
//! - `platform`: Content script and options page APIs
//! - `registration`: Link rewriter (un)registration
//! - `interstitial`: Blocked page controller and bypass actions
//! - `content`: Link rewriter controller

pub mod content;
pub mod error;
pub mod interstitial;
pub mod message;
pub mod platform;
pub mod registration;
pub mod service;

pub use content::{LinkRewriter, RewriteRecord, RewriterSettings};
pub use error::{PlatformError, Result, ServiceError};
pub use interstitial::{BlockedPage, Bypass, InterstitialController, ALLOW_ONCE_MS, ALLOW_TEMPORARILY_MS};
pub use message::{Message, Response};
pub use platform::{ContentScript, MemoryPlatform, Platform, RunAt};
pub use registration::{link_rewriter_script, update_content_script_registration, LINK_REWRITER_ID};
pub use service::{next_allowlist_expiry, BackgroundService, RecompileReport, ServiceHandle};
