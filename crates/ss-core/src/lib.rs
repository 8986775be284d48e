//! SourceSwitch Core Library
//!
//! Shared building blocks for the SourceSwitch blocker: the declarative rule
//! model, URL helpers, input validators, the static preset catalog, the link
//! rewrite resolver and a reference matcher that evaluates a rule set the
//! way the browser's request-filtering engine does.
//!
//! # Modules
//!
//! - `types`: Rule, action and resource type definitions
//! - `url`: Host/path extraction, `urlFilter` matching, percent encoding
//! - `validate`: Character-class validators for domains and endpoints
//! - `catalog`: Built-in preset catalog and default blocked domains
//! - `rewrite`: Alternative-site resolution for blocked URLs
//! - `matcher`: Priority-based request matching

pub mod catalog;
pub mod matcher;
pub mod rewrite;
pub mod types;
pub mod url;
pub mod validate;

// Re-export commonly used types
pub use catalog::{Alternative, DomainPattern, Preset, PresetCatalog, DEFAULT_BLOCKED_DOMAINS};
pub use matcher::Matcher;
pub use rewrite::{resolve_alternative, AlternativeKind, AlternativeLink};
pub use types::{MatchDecision, MatchResult, RequestContext, ResourceType, Rule, RuleAction, RuleCondition};
pub use validate::{is_valid_domain, is_valid_endpoint, ValidationError};
