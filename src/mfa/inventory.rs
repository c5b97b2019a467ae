//! A user's token inventory on the MFA server.
//!
//! A token counts as validated once it has completed at least one
//! authentication (`info.count_auth_success` is present). Tokens that were
//! enrolled but never used are leftovers from abandoned enrollments and are
//! deleted whenever the inventory is checked.

use crate::{
    metrics::{MetricSink, CATEGORY_MFA, DELETE_INACTIVE_TOKEN},
    mfa::{
        auth::AuthToken,
        client::MfaClient,
        error::{Error, Result},
    },
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const VALIDATED_MARKER: &str = "count_auth_success";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRecord {
    pub serial: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl TokenRecord {
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.info.contains_key(VALIDATED_MARKER)
    }
}

/// `result.value` of `GET /token/`. `tokens` stays raw until `count` says
/// there is something to look at.
#[derive(Debug, Deserialize)]
struct TokenList {
    count: u64,
    #[serde(default)]
    tokens: Value,
}

/// Check whether `username` owns a validated token, deleting every
/// unvalidated one on the way.
///
/// # Errors
/// Returns `Error::Transport` if the listing fails and `Error::Protocol` if it
/// has no `result.value.count` or an unreadable token list.
#[instrument(skip(client, auth_token, metrics))]
pub async fn user_has_valid_token(
    client: &MfaClient,
    auth_token: &AuthToken,
    username: &str,
    metrics: &dyn MetricSink,
) -> Result<bool> {
    let response = client
        .call(Method::GET, "/token/", &[("user", username)], Some(auth_token))
        .await?;

    let list: TokenList = response
        .body
        .get("result")
        .and_then(|v| v.get("value"))
        .filter(|v| v.get("count").is_some())
        .ok_or_else(|| response.missing("count"))
        .and_then(|value| {
            TokenList::deserialize(value)
                .map_err(|e| Error::protocol(&response.url, format!("invalid token list: {e}")))
        })?;

    if list.count == 0 {
        return Ok(false);
    }

    let tokens = Vec::<TokenRecord>::deserialize(&list.tokens)
        .map_err(|e| Error::protocol(&response.url, format!("invalid token list: {e}")))?;

    let mut has_valid_token = false;

    for token in &tokens {
        if token.is_validated() {
            debug!("user {} has active token {}", token.username, token.serial);
            has_valid_token = true;
        } else {
            metrics.log_metric(
                CATEGORY_MFA,
                DELETE_INACTIVE_TOKEN,
                &[
                    ("user", token.username.as_str()),
                    ("tokenSerial", token.serial.as_str()),
                ],
            );
            info!(
                "user {} has inactive token {}. Deleting",
                token.username, token.serial
            );
            remove_unactivated_token(client, auth_token, &token.serial).await;
        }
    }

    Ok(has_valid_token)
}

/// `/token/<serial>` with the serial escaped as a single path segment.
fn token_path(serial: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/token") else {
        return format!("/token/{serial}");
    };

    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(serial);
    }

    url.path().to_string()
}

/// Delete a token that never completed enrollment.
///
/// Best effort: failures are logged and dropped, the next inventory check
/// tries again.
pub async fn remove_unactivated_token(client: &MfaClient, auth_token: &AuthToken, serial: &str) {
    let path = token_path(serial);

    match client
        .call(Method::DELETE, &path, &[], Some(auth_token))
        .await
    {
        Ok(response) => {
            let accepted = response
                .body
                .get("result")
                .and_then(|v| v.get("status"))
                .and_then(Value::as_bool)
                .unwrap_or(true);

            if !response.status.is_success() || !accepted {
                warn!(
                    "Failed to delete token {}: {} {}",
                    serial,
                    response.status,
                    response.error_message().unwrap_or_default()
                );
            }
        }
        Err(e) => {
            warn!("Failed to delete token {}: {}", serial, e);
        }
    }
}
