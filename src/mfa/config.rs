//! MFA server configuration.
//!
//! A `ServerConfig` comes from the filter's own settings and may leave any
//! field unset. Unset fields are filled from the `privacyidea:serverconfig`
//! map that an earlier stage of the SSO pipeline may have put in the state,
//! and only then do defaults apply. `resolve` turns the result into a
//! `ResolvedConfig`, which is the only form the HTTP layer accepts.

use secrecy::SecretString;
use serde_json::{Map, Value};
use std::fmt;

pub const DEFAULT_UID_KEY: &str = "uid";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenType {
    #[default]
    Totp,
    U2f,
    /// Any other type the MFA server enrolls with a QR code and seed.
    Other(String),
}

impl TokenType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Totp => "totp",
            Self::U2f => "u2f",
            Self::Other(other) => other,
        }
    }

    #[must_use]
    pub fn is_u2f(&self) -> bool {
        matches!(self, Self::U2f)
    }
}

impl From<&str> for TokenType {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "totp" => Self::Totp,
            "u2f" => Self::U2f,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub server: Option<String>,
    pub ssl_verify_host: Option<bool>,
    pub ssl_verify_peer: Option<bool>,
    pub realm: Option<String>,
    pub uid_key: Option<String>,
    pub enabled_path: Option<String>,
    pub enabled_key: Option<String>,
    pub service_account: Option<String>,
    pub service_pass: Option<SecretString>,
    pub token_type: Option<TokenType>,
}

impl ServerConfig {
    /// Read a config from a JSON object using the filter's setting names
    /// (`privacyideaserver`, `sslverifyhost`, `uidKey`, ...).
    ///
    /// Unknown keys are ignored, so is a value of the wrong shape.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            server: string_setting(map, "privacyideaserver"),
            ssl_verify_host: bool_setting(map, "sslverifyhost"),
            ssl_verify_peer: bool_setting(map, "sslverifypeer"),
            realm: string_setting(map, "realm"),
            uid_key: string_setting(map, "uidKey"),
            enabled_path: string_setting(map, "enabledPath"),
            enabled_key: string_setting(map, "enabledKey"),
            service_account: string_setting(map, "serviceAccount"),
            service_pass: string_setting(map, "servicePass").map(SecretString::from),
            token_type: string_setting(map, "tokenType").map(|t| TokenType::from(t.as_str())),
        }
    }

    /// Fill every unset field from `fallback`; fields already set win.
    #[must_use]
    pub fn merged(self, fallback: Self) -> Self {
        Self {
            server: self.server.or(fallback.server),
            ssl_verify_host: self.ssl_verify_host.or(fallback.ssl_verify_host),
            ssl_verify_peer: self.ssl_verify_peer.or(fallback.ssl_verify_peer),
            realm: self.realm.or(fallback.realm),
            uid_key: self.uid_key.or(fallback.uid_key),
            enabled_path: self.enabled_path.or(fallback.enabled_path),
            enabled_key: self.enabled_key.or(fallback.enabled_key),
            service_account: self.service_account.or(fallback.service_account),
            service_pass: self.service_pass.or(fallback.service_pass),
            token_type: self.token_type.or(fallback.token_type),
        }
    }

    /// Settings without which enrollment cannot run.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.service_account.is_none() {
            missing.push("serviceAccount");
        }
        if self.service_pass.is_none() {
            missing.push("servicePass");
        }
        if self.server.is_none() {
            missing.push("privacyideaserver");
        }
        missing
    }

    /// Apply defaults and check the required settings.
    ///
    /// # Errors
    /// Returns the names of the missing required settings.
    pub fn resolve(self) -> Result<ResolvedConfig, Vec<&'static str>> {
        let missing = self.missing_required();

        match (self.server, self.service_account, self.service_pass) {
            (Some(server), Some(service_account), Some(service_pass)) => Ok(ResolvedConfig {
                server,
                ssl_verify_host: self.ssl_verify_host.unwrap_or(true),
                ssl_verify_peer: self.ssl_verify_peer.unwrap_or(true),
                realm: self.realm.filter(|realm| !realm.is_empty()),
                uid_key: self.uid_key.unwrap_or_else(|| DEFAULT_UID_KEY.to_string()),
                enabled_path: self.enabled_path,
                enabled_key: self.enabled_key,
                service_account,
                service_pass,
                token_type: self.token_type.unwrap_or_default(),
            }),
            _ => Err(missing),
        }
    }
}

/// A `ServerConfig` with defaults applied and the required settings present.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: String,
    pub ssl_verify_host: bool,
    pub ssl_verify_peer: bool,
    pub realm: Option<String>,
    pub uid_key: String,
    pub enabled_path: Option<String>,
    pub enabled_key: Option<String>,
    pub service_account: String,
    pub service_pass: SecretString,
    pub token_type: TokenType,
}

/// Loose truthiness for flags that arrive from attribute stores and config
/// maps as booleans, numbers or strings.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn string_setting(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn bool_setting(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(truthy(value)),
    }
}
