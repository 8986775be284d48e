//! Compiler and installation error types.

use thiserror::Error;

use crate::rule_class::RuleClass;

/// Errors produced while compiling a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// More rules of one class than its id range can hold.
    #[error("Rule class {class} exhausted its id range ({capacity} ids)")]
    RangeExhausted { class: RuleClass, capacity: usize },

    /// Two classes claim overlapping id ranges.
    #[error("Rule classes {first} and {second} have overlapping id ranges")]
    OverlappingRanges { first: RuleClass, second: RuleClass },

    /// A class range is empty or starts at id 0.
    #[error("Rule class {0} has a malformed id range")]
    MalformedRange(RuleClass),
}

/// A rejected call into the enforcement runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Rule id {0} is already installed")]
    DuplicateId(u32),

    #[error("Dynamic rule limit of {limit} exceeded")]
    LimitExceeded { limit: usize },

    #[error("Runtime rejected the request: {0}")]
    Rejected(String),
}

/// Failure of the remove-then-add replacement protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    /// Listing installed rules failed; nothing was changed.
    #[error("Failed to enumerate installed rules: {0}")]
    Enumerate(#[source] RuntimeError),

    /// Removing the previous rule set failed; the old rules may still be active.
    #[error("Failed to remove installed rules: {0}")]
    Remove(#[source] RuntimeError),

    /// The old rules are gone but the new ones were not added.
    #[error("Removed {removed} rules but failed to add the new set: {source}")]
    Add {
        removed: usize,
        #[source]
        source: RuntimeError,
    },
}

impl InstallError {
    /// True when the runtime is left without the new rules and without the old ones.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, InstallError::Add { .. })
    }
}
