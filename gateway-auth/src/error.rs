//! Token verification errors.

use std::time::Duration;

use thiserror::Error;

/// Failures reaching the identity provider's key set.
///
/// These are infrastructure faults: the caller presented nothing wrong, the
/// gateway could not reach its trust anchor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFetchError {
    /// Connection, TLS or body read failure.
    #[error("JWKS transport error: {0}")]
    Transport(String),

    /// The endpoint did not answer within the configured timeout.
    #[error("JWKS request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response.
    #[error("JWKS endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// Body was not a JWKS document.
    #[error("JWKS parse error: {0}")]
    Parse(String),
}

/// Which claim check rejected an otherwise well-signed token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimViolation {
    #[error("audience mismatch: expected '{expected}', got {actual:?}")]
    Audience {
        expected: String,
        actual: Vec<String>,
    },

    #[error("issuer mismatch: expected '{expected}', got {actual:?}")]
    Issuer {
        expected: String,
        actual: Option<String>,
    },

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("missing required claim '{0}'")]
    Missing(String),
}

/// Errors that can occur while verifying a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer credential was presented.
    #[error("Missing bearer credentials")]
    MissingCredentials,

    /// Token could not be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Declared algorithm is not in the asymmetric allow list.
    #[error("Disallowed algorithm: {0}")]
    DisallowedAlgorithm(String),

    /// No signing key matches the token's key id.
    #[error("Key not found: kid={0}")]
    UnknownKey(String),

    /// Signature did not verify against the selected key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Audience, issuer or temporal claims were rejected.
    #[error("Invalid claims: {0}")]
    InvalidClaims(ClaimViolation),

    /// The key set could not be retrieved.
    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(#[from] KeyFetchError),
}

/// Invalid or incomplete verifier configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl AuthError {
    /// Whether the failure is about the presented credential rather than the
    /// gateway's own infrastructure.
    pub fn is_credential_error(&self) -> bool {
        !matches!(self, AuthError::KeysUnavailable(_))
    }

    /// HTTP status an inbound layer should answer with.
    pub fn status_code(&self) -> u16 {
        if self.is_credential_error() { 401 } else { 500 }
    }

    /// Client-facing message. Never carries token, key or internal detail.
    pub fn public_message(&self) -> &'static str {
        if self.is_credential_error() {
            "Invalid credentials"
        } else {
            "Authentication service unavailable"
        }
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::Malformed(_) => "malformed",
            AuthError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::KeysUnavailable(_) => "keys_unavailable",
        }
    }
}

impl From<ClaimViolation> for AuthError {
    fn from(violation: ClaimViolation) -> Self {
        AuthError::InvalidClaims(violation)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => ClaimViolation::Expired.into(),
            ErrorKind::ImmatureSignature => ClaimViolation::NotYetValid.into(),
            ErrorKind::MissingRequiredClaim(claim) => ClaimViolation::Missing(claim.clone()).into(),
            // Expected/actual values are filled in by the verifier, which knows them.
            ErrorKind::InvalidAudience => ClaimViolation::Audience {
                expected: String::new(),
                actual: Vec::new(),
            }
            .into(),
            ErrorKind::InvalidIssuer => ClaimViolation::Issuer {
                expected: String::new(),
                actual: None,
            }
            .into(),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::DisallowedAlgorithm(err.to_string())
            }
            _ => AuthError::Malformed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for KeyFetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            KeyFetchError::Status { status: status.as_u16() }
        } else if err.is_decode() {
            KeyFetchError::Parse(err.to_string())
        } else {
            KeyFetchError::Transport(err.to_string())
        }
    }
}
