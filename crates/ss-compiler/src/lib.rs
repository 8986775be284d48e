//! SourceSwitch Rule Compiler
//!
//! This crate turns a preference snapshot into the declarative rule set the
//! browser enforces, and replaces the installed set through a runtime
//! abstraction.

pub mod compiler;
pub mod error;
pub mod optimizer;
pub mod rule_class;
pub mod runtime;

pub use compiler::{compile, interstitial_url, CompileStats, CompiledRuleSet, INTERSTITIAL_PATH};
pub use error::{CompileError, InstallError, RuntimeError};
pub use optimizer::{dedupe_patterns, OptimizeStats, PendingRule};
pub use rule_class::{verify_class_table, ClassLayout, RuleClass};
pub use runtime::{install_rules, InMemoryRuntime, InstallReport, RuleRuntime, RuleUpdate, MAX_DYNAMIC_RULES};
