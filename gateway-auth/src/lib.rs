//! Bearer token verification for the document gateway.
//!
//! The gateway trusts an external OAuth2 / OpenID Connect identity provider.
//! This crate fetches the provider's published signing keys (JWKS) and
//! verifies RS256-family JWTs against them: key id, signature, audience,
//! optional issuer, expiry and not-before.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gateway_auth::{AuthConfig, JwtVerifier, TokenVerifier};
//!
//! let config = AuthConfig::builder()
//!     .tenant_id("your-tenant-id")
//!     .client_id("your-client-id")
//!     .build()?;
//! let verifier = JwtVerifier::from_config(&config);
//!
//! match verifier.verify_bearer(authorization_header).await {
//!     Ok(claims) => println!("User: {}", claims.user_principal().unwrap_or("unknown")),
//!     Err(err) => respond(err.status_code(), err.public_message()),
//! }
//! ```
//!
//! Failures are typed so an inbound layer can tell a bad credential (401)
//! from an unreachable identity provider (500): see [`AuthError::status_code`].

mod bearer;
mod cache;
mod claims;
mod config;
mod error;
mod header;
mod jwks;
mod verifier;

pub use bearer::extract_bearer;
pub use cache::CachedKeySetProvider;
pub use claims::{Audience, Claims};
pub use config::{
    AUDIENCE_PREFIX, AuthConfig, AuthConfigBuilder, DEFAULT_AUTHORITY_HOST,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LEEWAY_SECS,
};
pub use error::{AuthError, ClaimViolation, ConfigError, KeyFetchError};
pub use header::{UnverifiedHeader, redact};
pub use jwks::{HttpKeySetProvider, KeySet, KeySetProvider, SigningKey};
pub use verifier::{JwtVerifier, JwtVerifierBuilder, TokenVerifier};

pub use jsonwebtoken::Algorithm;
