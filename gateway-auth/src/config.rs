//! Verifier configuration.
//!
//! Everything the verification core needs from the outside world (tenant,
//! client id, endpoints, timeouts) is carried here and injected at
//! construction, so tests can point the core at stub endpoints.

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::Serialize;

use crate::error::ConfigError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Audience prefix the identity provider puts in front of an application id.
pub const AUDIENCE_PREFIX: &str = "api://";

/// Default timeout of the outbound JWKS request, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// Default clock skew tolerated on `exp` and `nbf`, in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Configuration for the key set provider and token verifier.
///
/// Only [`AuthConfigBuilder::build`] and [`AuthConfig::from_env`] produce a
/// validated value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthConfig {
    /// Identity provider host, without trailing slash.
    pub authority_host: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// JWKS discovery endpoint.
    pub jwks_url: String,
    /// Expected `iss` claim, unchecked when `None`.
    pub issuer: Option<String>,
    /// Asymmetric algorithms a token may declare.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Clock skew tolerated on `exp` and `nbf`.
    pub leeway_secs: u64,
    /// Timeout of the outbound JWKS request.
    pub fetch_timeout_secs: u64,
    /// Key set cache lifetime; zero disables caching.
    pub cache_ttl_secs: u64,
    /// Minimum spacing between forced refreshes caused by unknown key ids.
    pub min_refresh_interval_secs: u64,
}

impl AuthConfig {
    /// Create a new builder for constructing an [`AuthConfig`].
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Read the configuration from `GATEWAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, used by [`AuthConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = AuthConfig::builder();
        if let Some(v) = get("GATEWAY_TENANT_ID") {
            builder = builder.tenant_id(v);
        }
        if let Some(v) = get("GATEWAY_CLIENT_ID") {
            builder = builder.client_id(v);
        }
        if let Some(v) = get("GATEWAY_AUTHORITY_HOST") {
            builder = builder.authority_host(v);
        }
        if let Some(v) = get("GATEWAY_AUDIENCE") {
            builder = builder.audience(v);
        }
        if let Some(v) = get("GATEWAY_JWKS_URL") {
            builder = builder.jwks_url(v);
        }
        if let Some(v) = get("GATEWAY_ISSUER") {
            builder = builder.issuer(v);
        }
        if let Some(v) = get("GATEWAY_ALGORITHMS") {
            builder = builder.algorithms(parse_algorithms(&v)?);
        }
        if let Some(v) = get("GATEWAY_LEEWAY_SECS") {
            builder = builder.leeway_secs(parse_secs("GATEWAY_LEEWAY_SECS", &v)?);
        }
        if let Some(v) = get("GATEWAY_JWKS_TIMEOUT_SECS") {
            builder = builder.fetch_timeout_secs(parse_secs("GATEWAY_JWKS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("GATEWAY_JWKS_CACHE_TTL_SECS") {
            builder = builder.cache_ttl_secs(parse_secs("GATEWAY_JWKS_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = get("GATEWAY_JWKS_MIN_REFRESH_SECS") {
            builder = builder
                .min_refresh_interval_secs(parse_secs("GATEWAY_JWKS_MIN_REFRESH_SECS", &v)?);
        }
        builder.build()
    }

    /// `{authority_host}/{tenant_id}`.
    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host, self.tenant_id)
    }

    /// OAuth2 authorization-code endpoint published to clients.
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority())
    }

    /// OAuth2 token endpoint published to clients.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }
}

/// Builder for a validated [`AuthConfig`].
#[derive(Debug, Clone)]
pub struct AuthConfigBuilder {
    authority_host: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    audience: Option<String>,
    jwks_url: Option<String>,
    issuer: Option<String>,
    allowed_algorithms: Vec<Algorithm>,
    leeway_secs: u64,
    fetch_timeout_secs: u64,
    cache_ttl_secs: u64,
    min_refresh_interval_secs: u64,
}

impl Default for AuthConfigBuilder {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: None,
            client_id: None,
            audience: None,
            jwks_url: None,
            issuer: None,
            allowed_algorithms: vec![Algorithm::RS256],
            leeway_secs: DEFAULT_LEEWAY_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            cache_ttl_secs: 3600,
            min_refresh_interval_secs: 30,
        }
    }
}

impl AuthConfigBuilder {
    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Override the expected audience (defaults to `api://{client_id}`).
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Override the JWKS URL (defaults to the tenant's v2.0 discovery keys).
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Replace the allowed algorithm list.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn min_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.min_refresh_interval_secs = secs;
        self
    }

    /// Build the [`AuthConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `tenant_id` or `client_id` is missing
    /// - the algorithm list is empty or names a non-asymmetric algorithm
    /// - `fetch_timeout_secs` is zero
    pub fn build(self) -> Result<AuthConfig, ConfigError> {
        let tenant_id = self.tenant_id.ok_or(ConfigError::Missing("tenant_id"))?;
        let client_id = self.client_id.ok_or(ConfigError::Missing("client_id"))?;

        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::Invalid {
                field: "allowed_algorithms",
                message: "at least one algorithm is required".to_string(),
            });
        }
        if let Some(alg) = self.allowed_algorithms.iter().find(|alg| !is_rsa_family(**alg)) {
            return Err(ConfigError::Invalid {
                field: "allowed_algorithms",
                message: format!("{alg:?} is not an RSA signature algorithm"),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        let authority_host = self.authority_host.trim_end_matches('/').to_string();
        let audience = self.audience.unwrap_or_else(|| format!("{AUDIENCE_PREFIX}{client_id}"));
        let jwks_url = self
            .jwks_url
            .unwrap_or_else(|| format!("{authority_host}/{tenant_id}/discovery/v2.0/keys"));

        Ok(AuthConfig {
            authority_host,
            tenant_id,
            client_id,
            audience,
            jwks_url,
            issuer: self.issuer,
            allowed_algorithms: self.allowed_algorithms,
            leeway_secs: self.leeway_secs,
            fetch_timeout_secs: self.fetch_timeout_secs,
            cache_ttl_secs: self.cache_ttl_secs,
            min_refresh_interval_secs: self.min_refresh_interval_secs,
        })
    }
}

/// RSA signature algorithms, the only ones a JWKS-published key may verify.
pub fn is_rsa_family(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<Algorithm>().map_err(|_| ConfigError::Invalid {
                field: "allowed_algorithms",
                message: format!("unknown algorithm '{name}'"),
            })
        })
        .collect()
}

fn parse_secs(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|e| ConfigError::Invalid {
            field,
            message: e.to_string(),
        })
}
