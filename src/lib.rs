//! # mfa-enroll
//!
//! Step-up MFA token enrollment for an SSO pipeline.
//!
//! When a user signs in without a usable second factor, [`TokenEnrollment`]
//! asks a privacyIDEA-compatible MFA server for the user's tokens, prunes the
//! ones that were never activated, and, if nothing usable is left, enrolls a
//! new TOTP or U2F token. The enrollment material (QR code, seed, otpauth URL
//! or U2F serial) is written into the per-request [`SsoState`] for the next
//! stage of the pipeline to show to the user.
//!
//! The service account's auth token is cached process-wide and fetched at most
//! once at a time, see [`mfa::AuthTokenCache`].

pub mod cli;
pub mod enrollment;
pub mod metrics;
pub mod mfa;

pub use self::enrollment::{state::SsoState, EnrollmentResult, Outcome, TokenEnrollment};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
