//! Claims extracted from verified tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Verified payload of a token.
///
/// Holds every claim the identity provider issued, exactly as signed. Typed
/// accessors return `None` when a claim is absent; the security-critical ones
/// (`aud`, `exp`) are guaranteed present by the verifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims {
    inner: Map<String, Value>,
}

impl Claims {
    pub fn new(inner: Map<String, Value>) -> Self {
        Self { inner }
    }

    /// Raw claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.get(name)
    }

    /// String claim by name. Non-string values read as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(Value::as_str)
    }

    /// Deserialize a claim into `T`.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.inner.get(name).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// Tenant id (Azure AD `tid`).
    pub fn tenant_id(&self) -> Option<&str> {
        self.get_str("tid")
    }

    pub fn audience(&self) -> Audience {
        self.get_as("aud").unwrap_or_default()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("exp")
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("iat")
    }

    /// The signed-in user's principal name.
    ///
    /// Prefers `upn`, then `preferred_username`, then `email`.
    pub fn user_principal(&self) -> Option<&str> {
        ["upn", "preferred_username", "email"]
            .into_iter()
            .find_map(|name| self.get_str(name))
    }

    /// `groups` and `roles` combined.
    pub fn all_groups(&self) -> Vec<&str> {
        ["groups", "roles"]
            .into_iter()
            .filter_map(|name| self.inner.get(name).and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.inner
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.inner
    }

    fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        let secs = self.inner.get(name).and_then(Value::as_i64)?;
        DateTime::from_timestamp(secs, 0)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(inner: Map<String, Value>) -> Self {
        Self::new(inner)
    }
}

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Check if audience contains a specific value.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == value,
            Audience::Multiple(v) => v.iter().any(|s| s == value),
        }
    }

    /// Get all audiences as a vector.
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            Audience::None => vec![],
            Audience::Single(s) => vec![s.as_str()],
            Audience::Multiple(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }
}
