//! Rule classes and their identifier ranges.
//!
//! Each class owns a disjoint, inclusive id range and a fixed priority, so
//! an installed rule can be attributed to its class from its id alone.

use std::fmt;

use ss_core::ResourceType;

use crate::error::CompileError;

/// Priority of allow rules. Beats every block and redirect rule.
pub const ALLOW_PRIORITY: u32 = 100;
/// Priority of strict-mode subresource block rules.
pub const STRICT_API_PRIORITY: u32 = 5;
/// Priority of main-frame redirect rules.
pub const BLOCK_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleClass {
    /// Always-on brand domains, redirected to the interstitial.
    DefaultBlock,
    /// User-added domains, redirected to the interstitial.
    CustomBlock,
    /// Active allowlist entries.
    Allow,
    /// Preset and custom API endpoints, blocked when strict mode is on.
    StrictApiBlock,
}

/// Static parameters of a rule class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    pub id_start: u32,
    /// Inclusive
    pub id_end: u32,
    pub priority: u32,
    pub resource_types: ResourceType,
}

impl ClassLayout {
    pub fn capacity(&self) -> usize {
        (self.id_end - self.id_start + 1) as usize
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.id_start..=self.id_end).contains(&id)
    }

    fn overlaps(&self, other: &ClassLayout) -> bool {
        self.id_start <= other.id_end && other.id_start <= self.id_end
    }
}

impl RuleClass {
    /// Every class, in emission order.
    pub const ALL: [RuleClass; 4] = [
        RuleClass::Allow,
        RuleClass::DefaultBlock,
        RuleClass::CustomBlock,
        RuleClass::StrictApiBlock,
    ];

    pub const fn layout(self) -> ClassLayout {
        match self {
            RuleClass::DefaultBlock => ClassLayout {
                id_start: 1,
                id_end: 99,
                priority: BLOCK_PRIORITY,
                resource_types: ResourceType::MAIN_FRAME,
            },
            RuleClass::CustomBlock => ClassLayout {
                id_start: 100,
                id_end: 499,
                priority: BLOCK_PRIORITY,
                resource_types: ResourceType::MAIN_FRAME,
            },
            RuleClass::Allow => ClassLayout {
                id_start: 500,
                id_end: 999,
                priority: ALLOW_PRIORITY,
                resource_types: ResourceType::MAIN_FRAME,
            },
            RuleClass::StrictApiBlock => ClassLayout {
                id_start: 1000,
                id_end: 2999,
                priority: STRICT_API_PRIORITY,
                resource_types: ResourceType::NON_NAVIGATION,
            },
        }
    }

    /// The class whose range contains `id`.
    pub fn of(id: u32) -> Option<RuleClass> {
        Self::ALL.into_iter().find(|class| class.layout().contains(id))
    }

    pub fn name(self) -> &'static str {
        match self {
            RuleClass::DefaultBlock => "default-block",
            RuleClass::CustomBlock => "custom-block",
            RuleClass::Allow => "allow",
            RuleClass::StrictApiBlock => "strict-api-block",
        }
    }
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that no two class ranges overlap and every range is well formed.
pub fn verify_class_table() -> Result<(), CompileError> {
    for (i, first) in RuleClass::ALL.iter().enumerate() {
        let layout = first.layout();
        if layout.id_start == 0 || layout.id_start > layout.id_end {
            return Err(CompileError::MalformedRange(*first));
        }
        for second in &RuleClass::ALL[i + 1..] {
            if layout.overlaps(&second.layout()) {
                return Err(CompileError::OverlappingRanges {
                    first: *first,
                    second: *second,
                });
            }
        }
    }
    Ok(())
}
