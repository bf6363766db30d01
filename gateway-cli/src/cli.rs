use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};
use gateway_auth::{AuthConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(
    name = "gateway-verify",
    version,
    about = "Verify gateway bearer tokens against the identity provider's JWKS"
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a token and print its claims
    Verify {
        /// Compact JWT; read from stdin when neither this nor --header is given
        #[arg(long, conflicts_with = "header")]
        token: Option<String>,
        /// Full Authorization header value, e.g. "Bearer eyJ..."
        #[arg(long)]
        header: Option<String>,
    },
    /// Fetch the JWKS document and list the usable key ids
    Keys,
    /// Print the OAuth2 endpoints derived from the configuration
    Endpoints,
}

/// Command-line overrides for the `GATEWAY_*` environment settings.
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// Directory (tenant) id [env: GATEWAY_TENANT_ID]
    #[arg(long, global = true)]
    pub tenant_id: Option<String>,
    /// Application (client) id [env: GATEWAY_CLIENT_ID]
    #[arg(long, global = true)]
    pub client_id: Option<String>,
    /// Expected audience [env: GATEWAY_AUDIENCE]
    #[arg(long, global = true)]
    pub audience: Option<String>,
    /// JWKS URL [env: GATEWAY_JWKS_URL]
    #[arg(long, global = true)]
    pub jwks_url: Option<String>,
    /// Expected issuer [env: GATEWAY_ISSUER]
    #[arg(long, global = true)]
    pub issuer: Option<String>,
    /// JWKS request timeout in seconds [env: GATEWAY_JWKS_TIMEOUT_SECS]
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        let mut put = |key, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key, v.clone());
            }
        };
        put("GATEWAY_TENANT_ID", &self.tenant_id);
        put("GATEWAY_CLIENT_ID", &self.client_id);
        put("GATEWAY_AUDIENCE", &self.audience);
        put("GATEWAY_JWKS_URL", &self.jwks_url);
        put("GATEWAY_ISSUER", &self.issuer);
        put("GATEWAY_JWKS_TIMEOUT_SECS", &self.timeout_secs.map(|s| s.to_string()));
        map
    }

    /// Flags first, then `env`.
    pub fn resolve<F>(&self, env: F) -> Result<AuthConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = self.overrides();
        AuthConfig::from_lookup(|key| overrides.get(key).cloned().or_else(|| env(key)))
    }
}
