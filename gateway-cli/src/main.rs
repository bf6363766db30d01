mod cli;

use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use gateway_auth::{AuthConfig, HttpKeySetProvider, JwtVerifier, KeySetProvider, TokenVerifier};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli
        .settings
        .resolve(|key| std::env::var(key).ok())
        .context("invalid gateway configuration")?;

    match cli.command {
        Command::Verify { token, header } => verify(&config, token, header).await,
        Command::Keys => keys(&config).await,
        Command::Endpoints => {
            let endpoints = json!({
                "authority": config.authority(),
                "authorize_url": config.authorize_url(),
                "token_url": config.token_url(),
                "jwks_url": config.jwks_url,
                "audience": config.audience,
            });
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prints what the gateway would answer: 200 with the caller's claims, or the
/// status and public message of the failure. Details go to the log.
async fn verify(
    config: &AuthConfig,
    token: Option<String>,
    header: Option<String>,
) -> anyhow::Result<ExitCode> {
    let verifier = JwtVerifier::from_config(config);
    let result = match (token, header) {
        (_, Some(header)) => verifier.verify_bearer(&header).await,
        (Some(token), None) => verifier.verify(token.trim()).await,
        (None, None) => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input).context("reading token from stdin")?;
            verifier.verify(input.trim()).await
        }
    };

    match result {
        Ok(claims) => {
            let body = json!({
                "status": 200,
                "user_principal": claims.user_principal().unwrap_or("unknown"),
                "claims": claims,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = json!({ "status": err.status_code(), "error": err.public_message() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            let code = if err.is_credential_error() { 1 } else { 2 };
            Ok(ExitCode::from(code))
        }
    }
}

async fn keys(config: &AuthConfig) -> anyhow::Result<ExitCode> {
    let provider = HttpKeySetProvider::from_config(config);
    let keys = provider
        .fetch_keys()
        .await
        .with_context(|| format!("fetching {}", provider.jwks_url()))?;

    tracing::info!(count = keys.len(), "JWKS fetched");
    for kid in keys.key_ids() {
        println!("{kid}");
    }
    Ok(ExitCode::SUCCESS)
}
