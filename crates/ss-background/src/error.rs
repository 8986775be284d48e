//! Background service errors.

use thiserror::Error;

use ss_compiler::{CompileError, InstallError};
use ss_store::StoreError;

/// A rejected platform call (scripting, tabs).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// The interstitial was opened without a URL or domain.
    #[error("Cannot bypass: blocked URL was not captured")]
    BypassUnavailable,

    /// The bypass was stored but the rule set could not be reinstalled.
    #[error("Rules were not updated: {0}")]
    RulesNotUpdated(String),

    #[error("Malformed message: {0}")]
    BadMessage(String),

    #[error("Message handler failed: {0}")]
    Task(String),

    /// The service loop has shut down.
    #[error("Background service is not running")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
