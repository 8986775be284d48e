//! Core type definitions for SourceSwitch
//!
//! These types mirror the declarative rule shape consumed by the browser's
//! request-filtering engine and are shared by the compiler, the store and
//! the bindings.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u16 {
        const MAIN_FRAME = 1 << 0;   // main document
        const SUB_FRAME = 1 << 1;    // iframe/frame
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const OBJECT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const PING = 1 << 8;
        const CSP_REPORT = 1 << 9;
        const MEDIA = 1 << 10;
        const WEBSOCKET = 1 << 11;
        const OTHER = 1 << 12;

        /// Subresource categories blocked in strict mode. Main documents are
        /// left to the navigation rules.
        const NON_NAVIGATION = Self::XMLHTTPREQUEST.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::FONT.bits()
            | Self::MEDIA.bits()
            | Self::OTHER.bits();
    }
}

const RESOURCE_TYPE_NAMES: [(ResourceType, &str); 13] = [
    (ResourceType::MAIN_FRAME, "main_frame"),
    (ResourceType::SUB_FRAME, "sub_frame"),
    (ResourceType::STYLESHEET, "stylesheet"),
    (ResourceType::SCRIPT, "script"),
    (ResourceType::IMAGE, "image"),
    (ResourceType::FONT, "font"),
    (ResourceType::OBJECT, "object"),
    (ResourceType::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceType::PING, "ping"),
    (ResourceType::CSP_REPORT, "csp_report"),
    (ResourceType::MEDIA, "media"),
    (ResourceType::WEBSOCKET, "websocket"),
    (ResourceType::OTHER, "other"),
];

impl ResourceType {
    /// Parse from a browser resource type string.
    pub fn from_rule_name(name: &str) -> Option<Self> {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Like [`ResourceType::from_rule_name`], also accepting common aliases.
    pub fn from_alias(name: &str) -> Option<Self> {
        match name {
            "document" => Some(Self::MAIN_FRAME),
            "subdocument" => Some(Self::SUB_FRAME),
            "css" => Some(Self::STYLESHEET),
            "js" => Some(Self::SCRIPT),
            "img" => Some(Self::IMAGE),
            "xhr" | "fetch" => Some(Self::XMLHTTPREQUEST),
            "ws" => Some(Self::WEBSOCKET),
            _ => Self::from_rule_name(name),
        }
    }

    /// Browser names of every flag set in this mask, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResourceTypeVisitor;

        impl<'de> Visitor<'de> for ResourceTypeVisitor {
            type Value = ResourceType;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a list of resource type names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut mask = ResourceType::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let flag = ResourceType::from_rule_name(&name).ok_or_else(|| {
                        de::Error::unknown_variant(&name, &["main_frame", "script", "other"])
                    })?;
                    mask |= flag;
                }
                Ok(mask)
            }
        }

        deserializer.deserialize_seq(ResourceTypeVisitor)
    }
}

// =============================================================================
// Rule Actions
// =============================================================================

/// Redirect target of a redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
}

/// Action to take for a matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    /// Exception rule - lets the request through
    Allow,
    /// Block rule - cancels the request
    Block,
    /// Redirect rule - sends the request elsewhere
    Redirect { redirect: Redirect },
}

impl RuleAction {
    pub fn redirect_to(url: impl Into<String>) -> Self {
        Self::Redirect {
            redirect: Redirect { url: url.into() },
        }
    }

    /// Rank used to break ties between rules of equal priority. Lower wins.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::Block => 1,
            Self::Redirect { .. } => 2,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::Redirect { .. } => "redirect",
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Condition under which a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: ResourceType,
}

/// A declarative rule as installed in the enforcement engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    pub fn url_filter(&self) -> &str {
        &self.condition.url_filter
    }

    pub fn resource_types(&self) -> ResourceType {
        self.condition.resource_types
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request type
    pub request_type: ResourceType,
}

impl<'a> RequestContext<'a> {
    pub fn main_frame(url: &'a str) -> Self {
        Self {
            url,
            request_type: ResourceType::MAIN_FRAME,
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Request is allowed (no matching rules, or an allow rule won)
    Allow,
    /// Request is blocked
    Block,
    /// Request is redirected
    Redirect,
}

/// Result of matching a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The final decision for this request
    pub decision: MatchDecision,
    /// Rule that determined the decision, if any matched
    pub rule_id: Option<u32>,
    /// Redirect URL if decision is Redirect
    pub redirect_url: Option<String>,
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::Allow,
            rule_id: None,
            redirect_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_types_serialize_as_names() {
        let json = serde_json::to_string(&ResourceType::NON_NAVIGATION).unwrap();
        assert_eq!(
            json,
            r#"["stylesheet","script","image","font","xmlhttprequest","media","other"]"#
        );
        assert!(!ResourceType::NON_NAVIGATION.contains(ResourceType::MAIN_FRAME));
    }

    #[test]
    fn rule_uses_declarative_shape() {
        let rule = Rule {
            id: 1,
            priority: 1,
            action: RuleAction::redirect_to("chrome-extension://abc/blocked.html"),
            condition: RuleCondition {
                url_filter: "||binance.com".to_string(),
                resource_types: ResourceType::MAIN_FRAME,
            },
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["action"]["type"], "redirect");
        assert_eq!(value["action"]["redirect"]["url"], "chrome-extension://abc/blocked.html");
        assert_eq!(value["condition"]["urlFilter"], "||binance.com");
        assert_eq!(value["condition"]["resourceTypes"][0], "main_frame");

        let back: Rule = serde_json::from_value(value).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn unknown_resource_type_is_rejected() {
        let err = serde_json::from_str::<ResourceType>(r#"["main_frame","bogus"]"#);
        assert!(err.is_err());
        assert_eq!(ResourceType::from_alias("bogus"), None);
        assert_eq!(ResourceType::from_alias("xhr"), Some(ResourceType::XMLHTTPREQUEST));
        assert_eq!(ResourceType::from_alias("script"), Some(ResourceType::SCRIPT));
    }

    #[test]
    fn rule_names_parse() {
        assert_eq!(ResourceType::from_rule_name("main_frame"), Some(ResourceType::MAIN_FRAME));
        assert_eq!(ResourceType::from_rule_name("xmlhttprequest"), Some(ResourceType::XMLHTTPREQUEST));
        assert_eq!(ResourceType::from_rule_name("MAIN_FRAME"), None);
        assert_eq!(ResourceType::from_rule_name("xhr"), None);
    }

    #[test]
    fn allow_outranks_block_and_redirect() {
        assert!(RuleAction::Allow.precedence() < RuleAction::Block.precedence());
        assert!(RuleAction::Block.precedence() < RuleAction::redirect_to("x").precedence());
    }
}
