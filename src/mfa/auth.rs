//! Service-account authentication and the shared auth-token cache.
//!
//! The MFA server wants an auth token on every management call. Fetching one
//! means a password login for the service account, so the token is cached and
//! shared by every request in the process. Concurrent misses are coalesced
//! into a single `/auth` call.

use crate::mfa::{
    client::MfaClient,
    config::ResolvedConfig,
    error::{Error, Result},
};
use moka::future::Cache;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Cache key for the service-account token. Bump the suffix whenever the
/// cached value changes shape.
pub const AUTH_TOKEN_CACHE_KEY: &str = "mfa-api-token:v1";

pub const DEFAULT_AUTH_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct AuthToken(SecretString);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

/// Log in with the service account.
///
/// # Errors
/// Returns `Error::Transport` if the call fails and `Error::Protocol` if the
/// response has no `result.value.token`.
#[instrument(skip(client, config), fields(account = %config.service_account))]
pub async fn fetch_auth_token(client: &MfaClient, config: &ResolvedConfig) -> Result<AuthToken> {
    let response = client
        .call(
            Method::POST,
            "/auth",
            &[
                ("username", config.service_account.as_str()),
                ("password", config.service_pass.expose_secret()),
            ],
            None,
        )
        .await?;

    let token = response
        .body
        .get("result")
        .and_then(|v| v.get("value"))
        .and_then(|v| v.get("token"))
        .and_then(Value::as_str)
        .ok_or_else(|| response.missing("token"))?;

    Ok(AuthToken::new(token))
}

/// Process-wide auth-token cache. Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct AuthTokenCache {
    cache: Cache<String, AuthToken>,
}

impl AuthTokenCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(16).time_to_live(ttl).build();

        Self { cache }
    }

    /// Return the cached token, or run `fetch` to get one.
    ///
    /// When several callers miss at the same time only one `fetch` runs and
    /// every caller gets its result. A failed fetch is not cached.
    ///
    /// # Errors
    /// Returns the error produced by `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<AuthToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthToken>>,
    {
        self.cache
            .try_get_with(AUTH_TOKEN_CACHE_KEY.to_string(), async {
                debug!("auth token cache miss, fetching token");
                fetch().await
            })
            .await
            .map_err(|e: Arc<Error>| Arc::unwrap_or_clone(e))
    }

    /// Cached token for the service account in `config`, logging in on a miss.
    ///
    /// # Errors
    /// See [`fetch_auth_token`].
    pub async fn auth_token(&self, client: &MfaClient, config: &ResolvedConfig) -> Result<AuthToken> {
        self.get_or_fetch(|| fetch_auth_token(client, config)).await
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(AUTH_TOKEN_CACHE_KEY).await;
    }

    #[must_use]
    pub fn contains_token(&self) -> bool {
        self.cache.contains_key(AUTH_TOKEN_CACHE_KEY)
    }
}

impl Default for AuthTokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_TOKEN_TTL)
    }
}
