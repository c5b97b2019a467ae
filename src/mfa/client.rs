//! HTTP access to the MFA server.
//!
//! Every call goes to `server + path`. GET and DELETE carry their parameters in
//! the query string, POST sends them as a form body. The response body is
//! decoded as JSON and handed back untouched: callers pick the fields they
//! need and raise `Error::Protocol` when a field is missing.

use crate::{
    mfa::{
        auth::AuthToken,
        config::ResolvedConfig,
        error::{Error, Result},
    },
    APP_USER_AGENT,
};
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

const MFA_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MFA_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Decoded reply from the MFA server.
#[derive(Debug)]
pub struct ApiResponse {
    pub url: String,
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    /// Error message the server put in `result.error.message`, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.body
            .get("result")
            .and_then(|v| v.get("error"))
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
    }

    /// Build a protocol error for a missing field, keeping the server's own
    /// error message and the HTTP status when there is one.
    #[must_use]
    pub fn missing(&self, what: &str) -> Error {
        let message = match self.error_message() {
            Some(server) => format!("{} - no {what} found, {server}", self.status),
            None => format!("{} - no {what} found", self.status),
        };
        Error::protocol(&self.url, message)
    }
}

#[derive(Debug, Clone)]
pub struct MfaClient {
    client: Client,
    base_url: String,
}

impl MfaClient {
    /// Build a client for one resolved server configuration.
    ///
    /// # Errors
    /// Returns `Error::Config` if the server URL is unusable or the HTTP client
    /// cannot be built.
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        let base_url = base_url(&config.server)?;

        if !config.ssl_verify_host {
            warn!("TLS hostname verification disabled for {}", base_url);
        }
        if !config.ssl_verify_peer {
            warn!("TLS certificate verification disabled for {}", base_url);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .connect_timeout(MFA_CONNECT_TIMEOUT)
            .timeout(MFA_REQUEST_TIMEOUT)
            .danger_accept_invalid_hostnames(!config.ssl_verify_host)
            .danger_accept_invalid_certs(!config.ssl_verify_peer)
            .build()
            .map_err(|e| Error::Config(format!("Error building HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send one request to the MFA server.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the request cannot be completed and
    /// `Error::Protocol` if the body is not JSON.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        auth_token: Option<&AuthToken>,
    ) -> Result<ApiResponse> {
        let url = self.endpoint_url(path);
        debug!("mfa request: {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Accept", "application/json");

        request = if method == Method::POST {
            request.form(params)
        } else {
            request.query(params)
        };

        if let Some(token) = auth_token {
            request = request.header("authorization", token.secret().expose_secret());
        }

        let span = info_span!(
            "mfa.call",
            http.method = %method,
            url = %url
        );
        let response = request
            .send()
            .instrument(span)
            .await
            .map_err(|e| Error::transport(&url, &e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transport(&url, &e))?;

        let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
            Error::protocol(&url, format!("{status} - response is not JSON: {e}"))
        })?;

        Ok(ApiResponse { url, status, body })
    }
}

/// Check the configured server URL and strip a trailing `/` so paths can be
/// appended verbatim.
///
/// # Errors
/// Returns `Error::Config` if `raw` cannot be parsed, has no host, or uses an
/// unsupported scheme.
pub fn base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| Error::Config(format!("Error parsing URL {raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::Config(format!(
                "Error parsing URL: unsupported scheme {scheme}"
            )))
        }
    }

    if url.host().is_none() {
        return Err(Error::Config(
            "Error parsing URL: no host specified".to_string(),
        ));
    }

    Ok(raw.trim_end_matches('/').to_string())
}
