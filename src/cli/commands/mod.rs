pub mod logging;
pub mod server;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_USER: &str = "user";
pub const ARG_STATE: &str = "state";
pub const ARG_CACHE_TTL: &str = "cache-ttl";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("mfa-enroll")
        .about("Step-up MFA token enrollment")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_USER)
                .short('u')
                .long(ARG_USER)
                .help("User identifier, stored as the uid attribute of the state")
                .env("MFA_ENROLL_USER"),
        )
        .arg(
            Arg::new(ARG_STATE)
                .short('s')
                .long(ARG_STATE)
                .help("JSON file with the SSO state to start from")
                .env("MFA_ENROLL_STATE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new(ARG_CACHE_TTL)
                .long(ARG_CACHE_TTL)
                .help("Seconds the service-account auth token is cached")
                .default_value("1800")
                .env("MFA_ENROLL_CACHE_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        );

    let command = server::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "mfa-enroll");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Step-up MFA token enrollment".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_args() {
        let matches = new().get_matches_from(vec![
            "mfa-enroll",
            "--user",
            "alice@example.org",
            "--server",
            "https://pi.example.org",
            "--service-account",
            "svc",
            "--service-pass",
            "secret",
            "--ssl-verify-peer",
            "false",
            "--cache-ttl",
            "60",
        ]);

        assert_eq!(
            matches.get_one::<String>(ARG_USER).cloned(),
            Some("alice@example.org".to_string())
        );
        assert_eq!(
            matches.get_one::<String>(server::ARG_SERVER).cloned(),
            Some("https://pi.example.org".to_string())
        );
        assert_eq!(
            matches.get_one::<bool>(server::ARG_SSL_VERIFY_PEER).copied(),
            Some(false)
        );
        assert_eq!(matches.get_one::<u64>(ARG_CACHE_TTL).copied(), Some(60));
    }

    #[test]
    fn test_cache_ttl_default() {
        temp_env::with_vars([("MFA_ENROLL_CACHE_TTL", None::<&str>)], || {
            let matches = new().get_matches_from(vec!["mfa-enroll"]);
            assert_eq!(matches.get_one::<u64>(ARG_CACHE_TTL).copied(), Some(1800));
        });
    }

    #[test]
    fn test_enabled_path_requires_key() {
        temp_env::with_vars(
            [
                ("MFA_ENROLL_ENABLED_PATH", None::<&str>),
                ("MFA_ENROLL_ENABLED_KEY", None::<&str>),
            ],
            || {
                let result =
                    new().try_get_matches_from(vec!["mfa-enroll", "--enabled-path", "Attributes"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("MFA_ENROLL_SERVER", Some("https://pi.example.org")),
                ("MFA_ENROLL_SERVICE_ACCOUNT", Some("svc")),
                ("MFA_ENROLL_SERVICE_PASS", Some("secret")),
                ("MFA_ENROLL_SSL_VERIFY_HOST", Some("no")),
                ("MFA_ENROLL_TOKEN_TYPE", Some("u2f")),
                ("MFA_ENROLL_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["mfa-enroll"]);
                let config = server::Options::parse(&matches);

                assert_eq!(config.server.as_deref(), Some("https://pi.example.org"));
                assert_eq!(config.service_account.as_deref(), Some("svc"));
                assert_eq!(config.ssl_verify_host, Some(false));
                assert_eq!(config.ssl_verify_peer, None);
                assert_eq!(
                    config.token_type,
                    Some(crate::mfa::config::TokenType::U2f)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("MFA_ENROLL_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["mfa-enroll".to_string()];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(index as u8)
                );
            });
        }
    }
}
