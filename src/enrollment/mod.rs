//! Token enrollment filter.
//!
//! Flow Overview:
//! 1) Merge the filter's settings with the `privacyidea:serverconfig` map from
//!    the state and decide whether the filter is enabled for this request.
//! 2) Get the service-account auth token (cached, shared across requests).
//! 3) Ask the MFA server for the user's tokens; unvalidated ones are deleted
//!    on the way.
//! 4) If no validated token is left, enroll a new one and put the enrollment
//!    material (QR code, seed and otpauth URL, or U2F serial) into the state.
//!
//! A disabled or unconfigured filter is a no-op. Any failure once the filter
//! is running aborts the request; the user must never end up half enrolled.

pub mod challenge;
pub mod state;

use crate::{
    metrics::{MetricSink, TracingMetrics, CATEGORY_MFA, CREATE_TOKEN},
    mfa::{
        auth::{AuthToken, AuthTokenCache},
        client::{ApiResponse, MfaClient},
        config::{ResolvedConfig, ServerConfig, TokenType},
        error::{Error, Result},
        inventory,
    },
};
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, info_span, instrument, Instrument};
use ulid::Ulid;

use self::state::{SsoState, TOKEN_ENROLLMENT_KEY};

pub const ENROLL_DESCRIPTION: &str = concat!("Enrolled with ", env!("CARGO_PKG_NAME"));

/// Material the user needs to finish enrolling a new token.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentResult {
    U2f {
        serial: String,
        auth_token: AuthToken,
    },
    Otp {
        qr_image: String,
        otpauth_url: String,
        seed: String,
    },
}

impl EnrollmentResult {
    /// Store the material under `privacyidea:tokenEnrollment`.
    pub fn write_to(&self, state: &mut SsoState) {
        match self {
            Self::U2f { serial, auth_token } => state.merge_section(
                TOKEN_ENROLLMENT_KEY,
                [
                    ("enrollU2F", Value::Bool(true)),
                    ("serial", Value::from(serial.as_str())),
                    (
                        "authToken",
                        Value::from(auth_token.secret().expose_secret()),
                    ),
                ],
            ),
            Self::Otp {
                qr_image,
                otpauth_url,
                seed,
            } => state.merge_section(
                TOKEN_ENROLLMENT_KEY,
                [
                    ("tokenQR", Value::from(qr_image.as_str())),
                    ("tokenSeed", Value::from(seed.as_str())),
                    ("otpauthUrl", Value::from(otpauth_url.as_str())),
                ],
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Filter switched off or not configured; nothing was sent.
    Disabled,
    /// The user already owns a validated token.
    AlreadyEnrolled,
    Enrolled(EnrollmentResult),
}

#[derive(Debug, Deserialize)]
struct EnrollDetail {
    serial: Option<String>,
    googleurl: Option<GoogleUrl>,
    otpkey: Option<OtpKey>,
}

#[derive(Debug, Deserialize)]
struct GoogleUrl {
    img: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct OtpKey {
    value_b32: String,
}

/// Name sent to `/token/init`: `uid` without a trailing `@<realm>`, the realm
/// travels in its own parameter.
#[must_use]
pub fn enrollment_username<'a>(uid: &'a str, realm: Option<&str>) -> &'a str {
    realm
        .and_then(|realm| uid.strip_suffix(realm))
        .and_then(|rest| rest.strip_suffix('@'))
        .unwrap_or(uid)
}

/// Ask the MFA server to generate a new token of the configured type.
///
/// # Errors
/// Returns `Error::Transport` if the call fails or `Error::Protocol` if the
/// reply is not JSON.
#[instrument(skip(client, auth_token, config), fields(token_type = %config.token_type))]
pub async fn enroll_token(
    client: &MfaClient,
    auth_token: &AuthToken,
    config: &ResolvedConfig,
    uid: &str,
) -> Result<ApiResponse> {
    let user = enrollment_username(uid, config.realm.as_deref());

    let mut params = vec![
        ("user", user),
        ("genkey", "1"),
        ("type", config.token_type.as_str()),
        ("description", ENROLL_DESCRIPTION),
    ];
    if let Some(realm) = config.realm.as_deref() {
        params.push(("realm", realm));
    }

    client
        .call(Method::POST, "/token/init", &params, Some(auth_token))
        .await
}

/// Pull the enrollment material for `token_type` out of a `/token/init` reply.
///
/// # Errors
/// Returns `Error::Protocol` if a required field is missing.
pub fn extract_enrollment(
    response: &ApiResponse,
    token_type: &TokenType,
    auth_token: &AuthToken,
) -> Result<EnrollmentResult> {
    let detail = response
        .body
        .get("detail")
        .ok_or_else(|| response.missing("detail"))
        .and_then(|detail| {
            EnrollDetail::deserialize(detail).map_err(|e| {
                Error::protocol(&response.url, format!("invalid enrollment detail: {e}"))
            })
        })?;

    if token_type.is_u2f() {
        let serial = detail
            .serial
            .ok_or_else(|| response.missing("detail.serial"))?;

        return Ok(EnrollmentResult::U2f {
            serial,
            auth_token: auth_token.clone(),
        });
    }

    let googleurl = detail
        .googleurl
        .ok_or_else(|| response.missing("detail.googleurl"))?;
    let otpkey = detail
        .otpkey
        .ok_or_else(|| response.missing("detail.otpkey"))?;

    Ok(EnrollmentResult::Otp {
        qr_image: googleurl.img,
        otpauth_url: googleurl.value,
        seed: otpkey.value_b32,
    })
}

/// The enrollment filter. One instance serves every request; the auth-token
/// cache inside it is the only state shared between requests.
#[derive(Clone)]
pub struct TokenEnrollment {
    config: ServerConfig,
    cache: AuthTokenCache,
    metrics: Arc<dyn MetricSink>,
}

impl TokenEnrollment {
    #[must_use]
    pub fn new(config: ServerConfig, cache: AuthTokenCache) -> Self {
        Self {
            config,
            cache,
            metrics: Arc::new(TracingMetrics),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricSink>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &AuthTokenCache {
        &self.cache
    }

    /// Merged configuration for this request, or `None` when the filter is
    /// switched off or cannot run.
    #[must_use]
    pub fn resolve(&self, state: &SsoState) -> Option<ResolvedConfig> {
        let config = self.config.clone().merged(state.server_config());

        let enabled = match (&config.enabled_path, &config.enabled_key) {
            (Some(path), Some(key)) => state.flag(path, key).unwrap_or(true),
            _ => true,
        };

        let missing = config.missing_required();
        if missing.contains(&"serviceAccount") || missing.contains(&"servicePass") {
            error!("service account for token enrollment is not set!");
        }
        if missing.contains(&"privacyideaserver") {
            error!("MFA server url is not set!");
        }

        if !enabled {
            info!("token enrollment disabled for this request");
            return None;
        }

        config.resolve().ok()
    }

    /// Run the filter for one request.
    ///
    /// # Errors
    /// Returns `Error::MissingAttribute` if the user identifier is absent,
    /// `Error::Config` for an unusable server URL, and the transport or
    /// protocol errors of the MFA calls. The state is left untouched on error.
    pub async fn process(&self, state: &mut SsoState) -> Result<Outcome> {
        let span = info_span!("mfa.enrollment", request_id = %Ulid::new());

        self.run(state).instrument(span).await
    }

    async fn run(&self, state: &mut SsoState) -> Result<Outcome> {
        let Some(config) = self.resolve(state) else {
            return Ok(Outcome::Disabled);
        };

        let uid = state
            .attribute(&config.uid_key)
            .map(ToString::to_string)
            .ok_or_else(|| Error::MissingAttribute(config.uid_key.clone()))?;

        let client = MfaClient::new(&config)?;
        let auth_token = self.cache.auth_token(&client, &config).await?;

        if inventory::user_has_valid_token(&client, &auth_token, &uid, self.metrics.as_ref()).await?
        {
            return Ok(Outcome::AlreadyEnrolled);
        }

        let response = enroll_token(&client, &auth_token, &config, &uid).await?;
        let result = extract_enrollment(&response, &config.token_type, &auth_token)?;
        result.write_to(state);

        self.metrics.log_metric(
            CATEGORY_MFA,
            CREATE_TOKEN,
            &[
                ("user", uid.as_str()),
                ("realm", config.realm.as_deref().unwrap_or_default()),
            ],
        );
        info!("enrolled {} token for {}", config.token_type, uid);

        Ok(Outcome::Enrolled(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn response(body: Value) -> ApiResponse {
        ApiResponse {
            url: "https://pi.example.org/token/init".to_string(),
            status: StatusCode::OK,
            body,
        }
    }

    #[test]
    fn enrollment_username_strips_realm_suffix() {
        assert_eq!(
            enrollment_username("alice@example.org", Some("example.org")),
            "alice"
        );
        assert_eq!(
            enrollment_username("alice@other.org", Some("example.org")),
            "alice@other.org"
        );
        assert_eq!(
            enrollment_username("aliceexample.org", Some("example.org")),
            "aliceexample.org"
        );
        assert_eq!(enrollment_username("alice@example.org", None), "alice@example.org");
    }

    #[test]
    fn extract_otp_material() -> Result<()> {
        let body = json!({
            "result": {"status": true, "value": true},
            "detail": {
                "serial": "TOTP0001",
                "googleurl": {"img": "X", "value": "Y", "description": "URL for google Authenticator"},
                "otpkey": {"value_b32": "Z", "value": "seed://abc"}
            }
        });

        let result = extract_enrollment(&response(body), &TokenType::Totp, &AuthToken::new("t"))?;
        assert_eq!(
            result,
            EnrollmentResult::Otp {
                qr_image: "X".to_string(),
                otpauth_url: "Y".to_string(),
                seed: "Z".to_string(),
            }
        );

        let mut state = SsoState::new();
        result.write_to(&mut state);
        let written = state.get(TOKEN_ENROLLMENT_KEY).cloned().unwrap_or_default();
        assert_eq!(written, json!({"tokenQR": "X", "otpauthUrl": "Y", "tokenSeed": "Z"}));
        Ok(())
    }

    #[test]
    fn extract_u2f_material() -> Result<()> {
        let body = json!({"detail": {"serial": "S"}});
        let token = AuthToken::new("api-token");

        let result = extract_enrollment(&response(body), &TokenType::U2f, &token)?;
        assert_eq!(
            result,
            EnrollmentResult::U2f {
                serial: "S".to_string(),
                auth_token: token,
            }
        );

        let mut state = SsoState::new();
        result.write_to(&mut state);
        let written = state.get(TOKEN_ENROLLMENT_KEY).cloned().unwrap_or_default();
        assert_eq!(
            written,
            json!({"enrollU2F": true, "serial": "S", "authToken": "api-token"})
        );
        Ok(())
    }

    #[test]
    fn extract_otp_without_seed_is_protocol_error() {
        let body = json!({"detail": {"googleurl": {"img": "X", "value": "Y"}}});
        let err = extract_enrollment(&response(body), &TokenType::Totp, &AuthToken::new("t")).err();
        assert!(matches!(err, Some(Error::Protocol { message, .. }) if message.contains("otpkey")));
    }

    #[test]
    fn extract_u2f_without_serial_is_protocol_error() {
        let body = json!({"detail": {"googleurl": {"img": "X", "value": "Y"}}});
        let err = extract_enrollment(&response(body), &TokenType::U2f, &AuthToken::new("t")).err();
        assert!(matches!(err, Some(Error::Protocol { .. })));
    }

    #[test]
    fn extract_without_detail_keeps_server_message() {
        let body = json!({"result": {"status": false, "error": {"message": "ERR303: missing policy"}}});
        let err = extract_enrollment(&response(body), &TokenType::Totp, &AuthToken::new("t")).err();
        assert!(
            matches!(err, Some(Error::Protocol { message, .. }) if message.contains("missing policy"))
        );
    }

    #[test]
    fn resolve_disabled_by_state_flag() {
        let config = ServerConfig {
            server: Some("https://pi.example.org".to_string()),
            service_account: Some("svc".to_string()),
            service_pass: Some(secrecy::SecretString::from("secret".to_string())),
            enabled_path: Some("Attributes".to_string()),
            enabled_key: Some("mfaEnroll".to_string()),
            ..ServerConfig::default()
        };
        let filter = TokenEnrollment::new(config, AuthTokenCache::default());

        let off = SsoState::from_value(json!({"Attributes": {"mfaEnroll": ["0"]}}))
            .unwrap_or_default();
        assert!(filter.resolve(&off).is_none());

        let on = SsoState::from_value(json!({"Attributes": {"mfaEnroll": ["1"]}}))
            .unwrap_or_default();
        assert!(filter.resolve(&on).is_some());

        // absent flag defaults to enabled
        assert!(filter.resolve(&SsoState::new()).is_some());

        let null = SsoState::from_value(json!({"Attributes": {"mfaEnroll": [null]}}))
            .unwrap_or_default();
        assert!(filter.resolve(&null).is_some());
    }

    #[test]
    fn resolve_uses_state_fallback() {
        let filter = TokenEnrollment::new(ServerConfig::default(), AuthTokenCache::default());
        let state = SsoState::from_value(json!({
            "privacyidea:serverconfig": {
                "privacyideaserver": "https://pi.example.org",
                "serviceAccount": "svc",
                "servicePass": "secret",
                "tokenType": "u2f"
            }
        }))
        .unwrap_or_default();

        let resolved = filter.resolve(&state);
        assert_eq!(
            resolved.map(|config| config.token_type),
            Some(TokenType::U2f)
        );
        assert!(filter.resolve(&SsoState::new()).is_none());
    }
}
