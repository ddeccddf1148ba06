//! Bearer credential extraction from the `Authorization` header.
//!
//! Accepts exactly `<scheme> <token>` where the scheme is `Bearer` in any
//! ASCII case. The header value is trimmed and split on whitespace, so runs
//! of spaces between scheme and token are tolerated, but a third token is
//! not.

use std::collections::HashMap;

use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Authentication scheme accepted by the extractor.
pub const BEARER_SCHEME: &str = "Bearer";

/// Extract the bearer credential from a plain header map.
///
/// Header names are matched case-insensitively. Returns `None` for every
/// malformed shape; never panics.
#[must_use]
pub fn extract_bearer_token<S: std::hash::BuildHasher>(
    headers: &HashMap<String, String, S>,
) -> Option<String> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
        .map(|(_, value)| value.as_str())?;
    parse_authorization(value)
}

/// Extract the bearer credential from an HTTP [`HeaderMap`].
///
/// Non-UTF-8 header values are treated as absent.
#[must_use]
pub fn bearer_from_header_map(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    parse_authorization(value)
}

/// Parse a raw `Authorization` header value.
#[must_use]
pub fn parse_authorization(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    Some(token.to_string())
}
