//! Unverified token inspection.
//!
//! Nothing decoded here is trusted: the header only selects a key and screens
//! the algorithm, the payload peek only feeds diagnostics.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::claims::Audience;
use crate::error::AuthError;

/// Header fields read before the signature is checked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnverifiedHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

impl UnverifiedHeader {
    /// Decode the first segment of a compact JWS.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(_payload), Some(_signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthError::Malformed("expected three dot-separated segments".into()));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| AuthError::Malformed(format!("header is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Malformed(format!("header is not a JOSE object: {e}")))
    }

    /// The key id, which a verifiable token must carry.
    pub fn require_kid(&self) -> Result<&str, AuthError> {
        self.kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::Malformed("token header has no key id".into()))
    }

    /// Resolve `alg` against the allow list.
    ///
    /// `none` and HMAC algorithms never appear in an allow list built through
    /// [`crate::AuthConfig`], so they are always refused here.
    pub fn algorithm(&self, allowed: &[Algorithm]) -> Result<Algorithm, AuthError> {
        self.alg
            .parse::<Algorithm>()
            .ok()
            .filter(|alg| allowed.contains(alg))
            .ok_or_else(|| AuthError::DisallowedAlgorithm(self.alg.clone()))
    }
}

/// Read the `aud` claim without verifying anything, for log output only.
pub(crate) fn peek_audience(token: &str) -> Option<Vec<String>> {
    #[derive(Deserialize)]
    struct Peek {
        #[serde(default)]
        aud: Audience,
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let peek: Peek = serde_json::from_slice(&bytes).ok()?;
    Some(peek.aud.as_vec().into_iter().map(str::to_string).collect())
}

/// Read the `iss` claim without verifying anything, for log output only.
pub(crate) fn peek_issuer(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Peek {
        iss: Option<String>,
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<Peek>(&bytes).ok()?.iss
}

/// Token prefix safe to put in a log line.
pub fn redact(token: &str) -> String {
    const VISIBLE: usize = 10;
    match token.char_indices().nth(VISIBLE) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => "...".to_string(),
    }
}
