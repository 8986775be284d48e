//! URL utilities
//!
//! Host and path extraction work directly on string slices. Filter matching
//! implements the subset of declarative `urlFilter` syntax the compiler emits.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// =============================================================================
// Scheme
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0 || !bytes[..colon_pos].iter().all(is_scheme_char) {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

#[inline]
fn is_scheme_char(b: &u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Host extraction without allocations.
/// Returns a slice into the original URL, or None when the URL has no authority.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    if host_start == host_end {
        return None;
    }
    Some(&url[host_start..host_end])
}

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    let authority_end = bytes[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(bytes.len(), |i| scheme_end + i);

    // Skip userinfo
    let host_start = bytes[scheme_end..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(scheme_end, |i| scheme_end + i + 1);

    let host_end = bytes[host_start..authority_end]
        .iter()
        .position(|&b| b == b':')
        .map_or(authority_end, |i| host_start + i);

    Some((host_start, host_end))
}

// =============================================================================
// Path Extraction
// =============================================================================

/// Extract the path portion of a URL (without query or fragment).
#[inline]
pub fn extract_path(url: &str) -> &str {
    let scheme_end = match get_scheme_end(url) {
        Some(pos) => pos,
        None => return "/",
    };

    let bytes = url.as_bytes();
    let path_start = match bytes[scheme_end..].iter().position(|&b| b == b'/' || b == b'?' || b == b'#') {
        Some(i) if bytes[scheme_end + i] == b'/' => scheme_end + i,
        _ => return "/",
    };

    let path_end = bytes[path_start..]
        .iter()
        .position(|&b| b == b'?' || b == b'#')
        .map_or(bytes.len(), |i| path_start + i);

    &url[path_start..path_end]
}

// =============================================================================
// Domain Relations
// =============================================================================

/// True when `host` is `domain` or one of its subdomains (ASCII case-insensitive).
pub fn is_domain_or_subdomain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    let domain = domain.trim_end_matches('.');
    if domain.is_empty() || host.len() < domain.len() {
        return false;
    }
    if host.len() == domain.len() {
        return host.eq_ignore_ascii_case(domain);
    }
    let split = host.len() - domain.len();
    let bytes = host.as_bytes();
    bytes[split - 1] == b'.' && bytes[split..].eq_ignore_ascii_case(domain.as_bytes())
}

/// Normalize a domain or endpoint for comparison: trimmed, lower-cased, no trailing dot.
pub fn normalize_pattern(pattern: &str) -> String {
    pattern.trim().trim_end_matches('.').to_ascii_lowercase()
}

// =============================================================================
// URL Filter Matching
// =============================================================================

/// Check whether a declarative `urlFilter` matches a URL.
///
/// `||host[/path]` is domain-anchored: the host must equal the filter's host
/// or be a subdomain of it, and any path part must prefix the URL path.
/// A leading `|` anchors to the start of the URL. Anything else is a
/// case-insensitive substring match.
pub fn url_filter_matches(filter: &str, url: &str) -> bool {
    if let Some(anchored) = filter.strip_prefix("||") {
        let (filter_host, filter_path) = match anchored.find('/') {
            Some(pos) => (&anchored[..pos], &anchored[pos..]),
            None => (anchored, ""),
        };
        let host = match extract_host(url) {
            Some(host) => host,
            None => return false,
        };
        if !is_domain_or_subdomain(host, filter_host) {
            return false;
        }
        return filter_path.is_empty() || starts_with_ignore_case(extract_path(url), filter_path);
    }

    if let Some(prefix) = filter.strip_prefix('|') {
        return starts_with_ignore_case(url, prefix);
    }

    url.to_ascii_lowercase().contains(&filter.to_ascii_lowercase())
}

#[inline]
fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len() && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

// =============================================================================
// Percent Encoding
// =============================================================================

/// Encode a query component the way `encodeURIComponent` does.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Decode a percent-encoded query component. Invalid UTF-8 is replaced lossily.
pub fn decode_component(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Find a query parameter value (percent-decoded) in a `?a=b&c=d` style string.
pub fn query_param(query: &str, key: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .map(|pair| match pair.find('=') {
            Some(eq_pos) => (&pair[..eq_pos], &pair[eq_pos + 1..]),
            None => (pair, ""),
        })
        .find(|(k, _)| *k == key)
        .map(|(_, v)| decode_component(&v.replace('+', " ")))
}
