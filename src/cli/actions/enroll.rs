use crate::{
    cli::telemetry,
    enrollment::{state::SsoState, Outcome, TokenEnrollment},
    mfa::{
        config::{ServerConfig, DEFAULT_UID_KEY},
        AuthTokenCache,
    },
};
use anyhow::{anyhow, Context, Result};
use std::{fs, path::PathBuf, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub config: ServerConfig,
    pub user: Option<String>,
    pub state_path: Option<PathBuf>,
    pub cache_ttl: Duration,
}

/// Read the starting state, an empty one when no file is given.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a JSON object.
pub fn load_state(path: Option<&PathBuf>) -> Result<SsoState> {
    let Some(path) = path else {
        return Ok(SsoState::new());
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in state file: {}", path.display()))?;

    SsoState::from_value(value)
        .ok_or_else(|| anyhow!("State file must hold a JSON object: {}", path.display()))
}

/// Attribute the user identifier is read from: the command line, then the
/// state's server settings, then `uid`.
fn uid_key(config: &ServerConfig, state: &SsoState) -> String {
    config
        .uid_key
        .clone()
        .or_else(|| state.server_config().uid_key)
        .unwrap_or_else(|| DEFAULT_UID_KEY.to_string())
}

/// Execute the enroll action and print the resulting state.
/// # Errors
/// Returns an error if the state cannot be loaded or the enrollment fails.
pub async fn execute(args: Args) -> Result<()> {
    let mut state = load_state(args.state_path.as_ref())?;

    if let Some(user) = args.user {
        let key = uid_key(&args.config, &state);
        debug!("setting attribute {} for {}", key, user);
        state.set_attribute(&key, vec![user]);
    }

    let enrollment = TokenEnrollment::new(args.config, AuthTokenCache::new(args.cache_ttl));
    let outcome = enrollment.process(&mut state).await;

    telemetry::shutdown_tracer();

    match outcome.context("token enrollment failed")? {
        Outcome::Disabled => info!("token enrollment skipped"),
        Outcome::AlreadyEnrolled => info!("user already has a validated token"),
        Outcome::Enrolled(_) => info!("token enrolled"),
    }

    println!("{}", serde_json::to_string_pretty(&state.into_value())?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn state_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mfa-enroll-{}.json", ulid::Ulid::new()));
        let mut file = fs::File::create(&path).unwrap_or_else(|e| panic!("create: {e}"));
        file.write_all(contents.as_bytes())
            .unwrap_or_else(|e| panic!("write: {e}"));
        path
    }

    #[test]
    fn load_state_without_path_is_empty() {
        let state = load_state(None).ok();
        assert_eq!(state.map(SsoState::into_value), Some(json!({})));
    }

    #[test]
    fn load_state_reads_object() {
        let path = state_file(r#"{"Attributes": {"uid": ["alice"]}}"#);
        let state = load_state(Some(&path));
        let _ = fs::remove_file(&path);

        let Ok(state) = state else {
            panic!("state should load");
        };
        assert_eq!(state.attribute("uid"), Some("alice"));
    }

    #[test]
    fn load_state_rejects_non_object() {
        let path = state_file("[1, 2, 3]");
        let result = load_state(Some(&path));
        let _ = fs::remove_file(&path);

        assert!(result.is_err());
    }

    #[test]
    fn load_state_reports_missing_file() {
        let path = std::env::temp_dir().join("mfa-enroll-does-not-exist.json");
        let err = load_state(Some(&path)).err();
        assert!(err.is_some_and(|e| e.to_string().contains("Failed to read state file")));
    }

    #[test]
    fn uid_key_prefers_command_line() {
        let mut state = SsoState::new();
        state.insert(
            crate::enrollment::state::SERVER_CONFIG_KEY,
            json!({"uidKey": "eduPersonPrincipalName"}),
        );

        let config = ServerConfig {
            uid_key: Some("mail".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(uid_key(&config, &state), "mail");
        assert_eq!(
            uid_key(&ServerConfig::default(), &state),
            "eduPersonPrincipalName"
        );
        assert_eq!(uid_key(&ServerConfig::default(), &SsoState::new()), "uid");
    }
}
