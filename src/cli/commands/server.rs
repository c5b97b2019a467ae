use crate::mfa::config::{ServerConfig, TokenType};
use clap::{builder::BoolishValueParser, Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SERVER: &str = "server";
pub const ARG_SSL_VERIFY_HOST: &str = "ssl-verify-host";
pub const ARG_SSL_VERIFY_PEER: &str = "ssl-verify-peer";
pub const ARG_REALM: &str = "realm";
pub const ARG_UID_KEY: &str = "uid-key";
pub const ARG_ENABLED_PATH: &str = "enabled-path";
pub const ARG_ENABLED_KEY: &str = "enabled-key";
pub const ARG_SERVICE_ACCOUNT: &str = "service-account";
pub const ARG_SERVICE_PASS: &str = "service-pass";
pub const ARG_TOKEN_TYPE: &str = "token-type";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SERVER)
                .long(ARG_SERVER)
                .help("MFA server base URL, example: https://pi.example.org")
                .env("MFA_ENROLL_SERVER"),
        )
        .arg(
            Arg::new(ARG_SSL_VERIFY_HOST)
                .long(ARG_SSL_VERIFY_HOST)
                .help("Verify that the server certificate matches the host name (default: true)")
                .env("MFA_ENROLL_SSL_VERIFY_HOST")
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SSL_VERIFY_PEER)
                .long(ARG_SSL_VERIFY_PEER)
                .help("Verify the server certificate chain (default: true)")
                .env("MFA_ENROLL_SSL_VERIFY_PEER")
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_REALM)
                .long(ARG_REALM)
                .help("Realm the user belongs to on the MFA server")
                .env("MFA_ENROLL_REALM"),
        )
        .arg(
            Arg::new(ARG_UID_KEY)
                .long(ARG_UID_KEY)
                .help("Attribute holding the user identifier (default: uid)")
                .env("MFA_ENROLL_UID_KEY"),
        )
        .arg(
            Arg::new(ARG_ENABLED_PATH)
                .long(ARG_ENABLED_PATH)
                .help("State entry holding the enable flag, example: Attributes")
                .env("MFA_ENROLL_ENABLED_PATH")
                .requires(ARG_ENABLED_KEY),
        )
        .arg(
            Arg::new(ARG_ENABLED_KEY)
                .long(ARG_ENABLED_KEY)
                .help("Key of the enable flag inside --enabled-path")
                .env("MFA_ENROLL_ENABLED_KEY")
                .requires(ARG_ENABLED_PATH),
        )
        .arg(
            Arg::new(ARG_SERVICE_ACCOUNT)
                .long(ARG_SERVICE_ACCOUNT)
                .help("Service account allowed to list and enroll tokens")
                .env("MFA_ENROLL_SERVICE_ACCOUNT"),
        )
        .arg(
            Arg::new(ARG_SERVICE_PASS)
                .long(ARG_SERVICE_PASS)
                .help("Password of the service account")
                .env("MFA_ENROLL_SERVICE_PASS")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TYPE)
                .long(ARG_TOKEN_TYPE)
                .help("Type of token to enroll: totp, u2f, ... (default: totp)")
                .env("MFA_ENROLL_TOKEN_TYPE"),
        )
}

pub struct Options;

impl Options {
    /// Server settings given on the command line or in the environment.
    /// Anything left out may still come from the state file.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> ServerConfig {
        let string = |id: &str| matches.get_one::<String>(id).cloned();

        ServerConfig {
            server: string(ARG_SERVER),
            ssl_verify_host: matches.get_one::<bool>(ARG_SSL_VERIFY_HOST).copied(),
            ssl_verify_peer: matches.get_one::<bool>(ARG_SSL_VERIFY_PEER).copied(),
            realm: string(ARG_REALM),
            uid_key: string(ARG_UID_KEY),
            enabled_path: string(ARG_ENABLED_PATH),
            enabled_key: string(ARG_ENABLED_KEY),
            service_account: string(ARG_SERVICE_ACCOUNT),
            service_pass: string(ARG_SERVICE_PASS).map(SecretString::from),
            token_type: string(ARG_TOKEN_TYPE).map(|t| TokenType::from(t.as_str())),
        }
    }
}
