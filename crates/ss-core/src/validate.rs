//! Character-class validators for user supplied domains and endpoints.
//!
//! Anything admitted here ends up inside a `urlFilter`, so only the
//! characters a hostname (or hostname plus path) can contain pass.

use thiserror::Error;

pub const MAX_DOMAIN_LEN: usize = 253;
pub const MAX_ENDPOINT_LEN: usize = 500;

/// Error type for rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),
    #[error("Invalid API endpoint: {0:?}")]
    InvalidEndpoint(String),
}

/// `[a-zA-Z0-9][a-zA-Z0-9.-]*[a-zA-Z0-9]`, at most 253 bytes.
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= MAX_DOMAIN_LEN && matches_class(domain.as_bytes(), false)
}

/// Like [`is_valid_domain`] but `/` is also allowed in the middle, at most 500 bytes.
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    endpoint.len() <= MAX_ENDPOINT_LEN && matches_class(endpoint.as_bytes(), true)
}

/// `[a-zA-Z0-9_-]+`
pub fn is_valid_preset_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn matches_class(bytes: &[u8], allow_slash: bool) -> bool {
    let (first, last) = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if bytes.len() >= 2 => (first, last),
        _ => return false,
    };
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    bytes[1..bytes.len() - 1]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || (allow_slash && b == b'/'))
}

/// Validate and normalize a domain for storage.
pub fn validate_domain(domain: &str) -> Result<String, ValidationError> {
    let trimmed = domain.trim();
    if !is_valid_domain(trimmed) {
        return Err(ValidationError::InvalidDomain(domain.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Validate and normalize an API endpoint for storage.
pub fn validate_endpoint(endpoint: &str) -> Result<String, ValidationError> {
    let trimmed = endpoint.trim();
    if !is_valid_endpoint(trimmed) {
        return Err(ValidationError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}
