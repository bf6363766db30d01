//! Shared fixtures: test-only RSA keys, a stub JWKS endpoint and token signing.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, Router, http::StatusCode, routing::get};
use gateway_auth::{KeyFetchError, KeySet, KeySetProvider, SigningKey};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const JWKS_PATH: &str = "/tenant/discovery/v2.0/keys";
pub const EXPECTED_AUDIENCE: &str = "api://expected-client";

pub const KEY_A_PEM: &str = include_str!("../fixtures/signing_key_a.pem");
pub const KEY_A_N: &str = "w-Gj5GwPbPJiD3dE2tXPdsYB768tYIeF1wUdXdj9icsLShxScqa-NaYIZ7DO6uUMlcm5zmRmob8ab2CDmajfGkgLdMOlwkJ2_isjIZQUoBvS4kbHr57ZlmeouJmZRMrhBrAujrVLp7pTsdFIAkbD5O95j8oHAZruLwg6Jxnna2DyB8gKFQj0LYhPGgFS3dUrrmdPGkTKdRAFYADenT1TqhN2NImg6ciTZTX1HCWS9xXShYYWZMNm3-tXD0ucKhcqT1SAbQAj6LrZKLK-Ab9iNYSdA0LHbOkCRDsvld47lH-99c21cTRGnM8ewwPneT6DZeHjtzb1JPtdO87Lvex1mQ";

pub const KEY_B_PEM: &str = include_str!("../fixtures/signing_key_b.pem");
pub const KEY_B_N: &str = "w8ByLSL2naQChfps0lkNGpMAnlkhSKL28j_U7alvvzlyZzntJOEcU3OFEBGsY9TjWrgGnwMmw5sU0e-RXzuprMmnm0PAQJ2tb3597A-uyRfjBEcWLPivdQ1F5IhF6W-RJj5W-s9MB-vHwvzVcC5_s9s7XJDW9UcQfgy40iEwRHKDQwJ39o_KOBR18cQDHIIroVqBbITzfLWfMBg-Y64u3Z4yVhIuS7DOifKHrimVMEDsFcdVNcyEjHc4O8aDmkSXStgOMfIH2cQEejyRpsKTTCQklNaeMJaAZH0AKLzXlYeyxnVzM3CbF-Uk7mKSRzUM1IuLEqOid78fO0u-mdYmhw";

pub const E: &str = "AQAB";

pub fn jwk(kid: &str, n: &str) -> Value {
    json!({"kty": "RSA", "use": "sig", "kid": kid, "n": n, "e": E})
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Payload accepted by a verifier expecting `aud`.
pub fn valid_claims(aud: &str) -> Value {
    let now = now();
    json!({
        "aud": aud,
        "iss": "https://login.microsoftonline.com/tenant/v2.0",
        "sub": "user-123",
        "upn": "alice@contoso.com",
        "name": "Alice",
        "roles": ["Documents.Read"],
        "iat": now,
        "nbf": now,
        "exp": now + 300,
    })
}

pub fn sign_with(alg: Algorithm, pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key"),
    )
    .expect("token")
}

pub fn sign(pem: &str, kid: &str, claims: &Value) -> String {
    sign_with(Algorithm::RS256, pem, Some(kid), claims)
}

/// JWKS endpoint on an ephemeral port. Returns the full JWKS URL.
pub async fn spawn_jwks_server(body: Value) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(JWKS_PATH, get(move || async move { Json(body.clone()) }));
    serve(app).await
}

/// JWKS endpoint serving each body in turn, repeating the last one.
/// The counter records how many requests were made.
pub async fn spawn_rotating_server(
    bodies: Vec<Value>,
) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let bodies = Arc::new(bodies);
    let app = Router::new().route(
        JWKS_PATH,
        get(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let body = bodies[n.min(bodies.len() - 1)].clone();
            async move { Json(body) }
        }),
    );
    let (url, handle) = serve(app).await;
    (url, hits, handle)
}

pub async fn spawn_status_server(status: StatusCode) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(JWKS_PATH, get(move || async move { status }));
    serve(app).await
}

pub async fn spawn_text_server(body: &'static str) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(JWKS_PATH, get(move || async move { body }));
    serve(app).await
}

pub async fn spawn_slow_server(delay: Duration) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        JWKS_PATH,
        get(move || async move {
            tokio::time::sleep(delay).await;
            Json(jwks(vec![jwk("abc", KEY_A_N)]))
        }),
    );
    serve(app).await
}

/// URL of a port nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}{JWKS_PATH}")
}

async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{addr}{JWKS_PATH}"), handle)
}

/// In-memory provider standing in for the identity provider.
pub struct StaticKeys(pub Arc<KeySet>);

impl StaticKeys {
    pub fn rsa(entries: &[(&str, &str)]) -> Self {
        let set: KeySet = entries
            .iter()
            .map(|(kid, n)| SigningKey::from_rsa_components(*kid, None, n, E).expect("rsa key"))
            .collect();
        Self(Arc::new(set))
    }
}

#[async_trait]
impl KeySetProvider for StaticKeys {
    async fn fetch_keys(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        Ok(Arc::clone(&self.0))
    }
}
