//! Token verifier trait and JWT implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, TokenData, Validation};
use serde_json::{Map, Value};

use crate::bearer::extract_bearer;
use crate::cache::CachedKeySetProvider;
use crate::claims::Claims;
use crate::config::{AuthConfig, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LEEWAY_SECS, is_rsa_family};
use crate::error::{AuthError, ClaimViolation, ConfigError};
use crate::header::{UnverifiedHeader, peek_audience, peek_issuer, redact};
use crate::jwks::{HttpKeySetProvider, KeySet, KeySetProvider};

/// Trait for verifying bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a compact JWT and return its claims.
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;

    /// Verify the token carried by an `Authorization` header value.
    async fn verify_bearer(&self, header_value: &str) -> Result<Claims, AuthError> {
        let token = extract_bearer(header_value)?;
        self.verify(token).await
    }
}

/// JWT verifier with JWKS-based signature verification.
pub struct JwtVerifier {
    /// Expected audience.
    audience: String,
    /// Expected issuer.
    issuer: Option<String>,
    /// Allowed algorithms.
    algorithms: Vec<Algorithm>,
    leeway_secs: u64,
    keys: Arc<dyn KeySetProvider>,
}

impl JwtVerifier {
    /// Create a new builder.
    pub fn builder() -> JwtVerifierBuilder {
        JwtVerifierBuilder::default()
    }

    /// Verifier backed by a cached HTTP key set provider.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::with_provider(config, Arc::new(CachedKeySetProvider::from_config(config)))
    }

    /// Verifier using `config`'s claim rules and an explicit key provider.
    ///
    /// Algorithms outside the RSA family are dropped from the allow list, so a
    /// hand-built config cannot enable HMAC or `none`.
    pub fn with_provider(config: &AuthConfig, keys: Arc<dyn KeySetProvider>) -> Self {
        let (algorithms, ignored): (Vec<Algorithm>, Vec<Algorithm>) = config
            .allowed_algorithms
            .iter()
            .copied()
            .partition(|alg| is_rsa_family(*alg));
        if !ignored.is_empty() {
            tracing::warn!(?ignored, "ignoring non-RSA algorithms in allow list");
        }

        Self {
            audience: config.audience.clone(),
            issuer: config.issuer.clone(),
            algorithms,
            leeway_secs: config.leeway_secs,
            keys,
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify `token` against an explicit audience instead of the configured one.
    pub async fn verify_with_audience(
        &self,
        token: &str,
        expected_audience: &str,
    ) -> Result<Claims, AuthError> {
        match self.verify_inner(token, expected_audience).await {
            Ok(claims) => {
                tracing::debug!(
                    sub = claims.subject().unwrap_or("unknown"),
                    "token verified"
                );
                Ok(claims)
            }
            Err(err) => {
                self.log_failure(token, expected_audience, &err);
                Err(err)
            }
        }
    }

    async fn verify_inner(
        &self,
        token: &str,
        expected_audience: &str,
    ) -> Result<Claims, AuthError> {
        let header = UnverifiedHeader::decode(token)?;
        tracing::debug!(alg = %header.alg, kid = ?header.kid, "token header");
        let kid = header.require_kid()?;
        let alg = header.algorithm(&self.algorithms)?;

        let keys = self.key_set_for(kid).await?;
        let key = keys
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))?;

        if let Some(pinned) = key.algorithm() {
            if pinned != alg {
                return Err(AuthError::DisallowedAlgorithm(format!(
                    "{alg:?} does not match key algorithm {pinned:?}"
                )));
            }
        }

        let validation = self.validation(alg, expected_audience);
        let data: TokenData<Map<String, Value>> =
            jsonwebtoken::decode(token, key.decoding_key(), &validation)
                .map_err(|err| self.describe(AuthError::from(err), token, expected_audience))?;

        Ok(Claims::new(data.claims))
    }

    /// Key set containing `kid`, refreshing once through the provider when the
    /// current set lacks it.
    async fn key_set_for(&self, kid: &str) -> Result<Arc<KeySet>, AuthError> {
        let keys = self.keys.fetch_keys().await?;
        if keys.contains(kid) {
            return Ok(keys);
        }
        self.keys
            .refresh_for_unknown_key(kid)
            .await?
            .filter(|refreshed| refreshed.contains(kid))
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    fn validation(&self, alg: Algorithm, expected_audience: &str) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    /// Fill in expected/actual values the JWT library does not report.
    fn describe(&self, err: AuthError, token: &str, expected_audience: &str) -> AuthError {
        match err {
            AuthError::InvalidClaims(ClaimViolation::Audience { .. }) => ClaimViolation::Audience {
                expected: expected_audience.to_string(),
                actual: peek_audience(token).unwrap_or_default(),
            }
            .into(),
            AuthError::InvalidClaims(ClaimViolation::Issuer { .. }) => ClaimViolation::Issuer {
                expected: self.issuer.clone().unwrap_or_default(),
                actual: peek_issuer(token),
            }
            .into(),
            other => other,
        }
    }

    fn log_failure(&self, token: &str, expected_audience: &str, err: &AuthError) {
        let token_prefix = redact(token);
        if err.is_credential_error() {
            tracing::warn!(
                kind = err.kind(),
                token = %token_prefix,
                expected_audience,
                actual_audience = ?peek_audience(token),
                error = %err,
                "token verification failed"
            );
        } else {
            tracing::error!(
                kind = err.kind(),
                token = %token_prefix,
                error = %err,
                "token verification aborted: signing keys unavailable"
            );
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_with_audience(token, &self.audience).await
    }
}

/// Builder for JwtVerifier.
#[derive(Default)]
pub struct JwtVerifierBuilder {
    audience: Option<String>,
    issuer: Option<String>,
    algorithms: Vec<Algorithm>,
    leeway_secs: Option<u64>,
    keys: Option<Arc<dyn KeySetProvider>>,
}

impl JwtVerifierBuilder {
    /// Set the expected audience.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the expected issuer.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Add an allowed algorithm.
    pub fn algorithm(mut self, alg: Algorithm) -> Self {
        self.algorithms.push(alg);
        self
    }

    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = Some(secs);
        self
    }

    /// Set the key set provider.
    pub fn key_provider(mut self, keys: Arc<dyn KeySetProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Use a cached HTTP provider for `jwks_url` with default settings.
    pub fn jwks_url(self, jwks_url: impl Into<String>) -> Self {
        let timeout = Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS);
        let provider = HttpKeySetProvider::new(jwks_url, timeout);
        self.key_provider(Arc::new(CachedKeySetProvider::new(provider)))
    }

    /// Build the verifier.
    pub fn build(self) -> Result<JwtVerifier, ConfigError> {
        let audience = self.audience.ok_or(ConfigError::Missing("audience"))?;
        let keys = self.keys.ok_or(ConfigError::Missing("key_provider"))?;

        let algorithms = if self.algorithms.is_empty() {
            vec![Algorithm::RS256]
        } else {
            self.algorithms
        };
        if let Some(alg) = algorithms.iter().find(|alg| !is_rsa_family(**alg)) {
            return Err(ConfigError::Invalid {
                field: "algorithms",
                message: format!("{alg:?} is not an RSA signature algorithm"),
            });
        }

        Ok(JwtVerifier {
            audience,
            issuer: self.issuer,
            algorithms,
            leeway_secs: self.leeway_secs.unwrap_or(DEFAULT_LEEWAY_SECS),
            keys,
        })
    }
}
