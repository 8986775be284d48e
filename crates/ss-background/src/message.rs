//! Control-channel messages between UI surfaces and the background service.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Recompile and reinstall the rule set.
    RulesUpdated,
    /// (Un)register the link rewriter according to `globalRewriting`.
    RewritingUpdated,
    /// Open the options page.
    OpenOptions,
}

impl Message {
    pub fn parse(json: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(json).map_err(|e| ServiceError::BadMessage(e.to_string()))
    }
}

/// Acknowledgement sent back for every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl<E: ToString> From<Result<(), E>> for Response {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Response::ok(),
            Err(e) => Response::failed(e),
        }
    }
}
