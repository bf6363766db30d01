//! `Authorization` header parsing.

use crate::error::AuthError;

const SCHEME: &str = "bearer";

/// Pull the token out of an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively. Anything other than a single
/// non-empty token after the scheme counts as no credentials at all.
pub fn extract_bearer(header_value: &str) -> Result<&str, AuthError> {
    let value = header_value.trim();
    let (scheme, token) = value
        .split_once(char::is_whitespace)
        .ok_or(AuthError::MissingCredentials)?;

    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(AuthError::MissingCredentials);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}
