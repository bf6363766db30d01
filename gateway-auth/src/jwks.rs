//! JWKS (JSON Web Key Set) retrieval.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;

use crate::config::{AuthConfig, is_rsa_family};
use crate::error::KeyFetchError;

/// A published verification key.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn new(
        key_id: impl Into<String>,
        algorithm: Option<Algorithm>,
        decoding_key: DecodingKey,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            decoding_key,
        }
    }

    /// Build an RSA key from base64url modulus and exponent.
    pub fn from_rsa_components(
        key_id: impl Into<String>,
        algorithm: Option<Algorithm>,
        n: &str,
        e: &str,
    ) -> Result<Self, KeyFetchError> {
        let decoding_key = DecodingKey::from_rsa_components(n, e)
            .map_err(|err| KeyFetchError::Parse(format!("invalid RSA components: {err}")))?;
        Ok(Self::new(key_id, algorithm, decoding_key))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm pinned by the JWK's `alg`, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

// Key material stays out of debug output.
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Keys from one JWKS response, by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JWKS document, keeping RSA signature keys that carry a `kid`.
    pub fn from_jwks_json(body: &[u8]) -> Result<Self, KeyFetchError> {
        let jwks: Jwks =
            serde_json::from_slice(body).map_err(|e| KeyFetchError::Parse(e.to_string()))?;

        let mut set = KeySet::new();
        for jwk in jwks.keys {
            match jwk.to_signing_key() {
                Ok(key) => set.insert(key),
                Err(reason) => tracing::debug!(kid = ?jwk.kid, %reason, "skipping JWKS entry"),
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, key: SigningKey) {
        self.keys.insert(key.key_id.clone(), key);
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<SigningKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = SigningKey>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// Source of the identity provider's signing keys.
#[async_trait]
pub trait KeySetProvider: Send + Sync {
    /// Current key set.
    async fn fetch_keys(&self) -> Result<Arc<KeySet>, KeyFetchError>;

    /// Called when `kid` is absent from the set returned by
    /// [`fetch_keys`](Self::fetch_keys). Returns a newer set, or `None` if no
    /// newer set may be fetched right now.
    async fn refresh_for_unknown_key(
        &self,
        _kid: &str,
    ) -> Result<Option<Arc<KeySet>>, KeyFetchError> {
        Ok(None)
    }
}

/// Fetches the JWKS document over HTTP on every call.
#[derive(Debug, Clone)]
pub struct HttpKeySetProvider {
    jwks_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpKeySetProvider {
    pub fn new(jwks_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(jwks_url, timeout, reqwest::Client::new())
    }

    /// Reuse an existing HTTP client (connection pool, proxy settings).
    pub fn with_client(
        jwks_url: impl Into<String>,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwks_url.clone(), config.fetch_timeout())
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    fn classify(&self, err: reqwest::Error) -> KeyFetchError {
        if err.is_timeout() {
            KeyFetchError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl KeySetProvider for HttpKeySetProvider {
    async fn fetch_keys(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        tracing::debug!(url = %self.jwks_url, "fetching JWKS");

        let result = async {
            let response = self
                .client
                .get(&self.jwks_url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(KeyFetchError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(|e| self.classify(e))?;
            KeySet::from_jwks_json(&body)
        }
        .await;

        match &result {
            Ok(keys) => tracing::debug!(url = %self.jwks_url, keys = keys.len(), "JWKS fetched"),
            Err(err) => tracing::error!(url = %self.jwks_url, error = %err, "failed to fetch JWKS"),
        }
        result.map(Arc::new)
    }
}

/// JWKS response structure.
#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// Individual JWK (JSON Web Key).
#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    use_: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl Jwk {
    fn to_signing_key(&self) -> Result<SigningKey, String> {
        let kid = self
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or("missing 'kid'")?;

        if let Some(use_) = self.use_.as_deref().filter(|u| *u != "sig") {
            return Err(format!("key use '{use_}' is not 'sig'"));
        }
        if self.kty != "RSA" {
            return Err(format!("unsupported key type '{}'", self.kty));
        }

        let algorithm = match self.alg.as_deref() {
            None => None,
            Some(name) => match name.parse::<Algorithm>() {
                Ok(alg) if is_rsa_family(alg) => Some(alg),
                _ => return Err(format!("unsupported key algorithm '{name}'")),
            },
        };

        let n = self.n.as_deref().ok_or("missing 'n' in RSA key")?;
        let e = self.e.as_deref().ok_or("missing 'e' in RSA key")?;
        SigningKey::from_rsa_components(kid, algorithm, n, e).map_err(|e| e.to_string())
    }
}
