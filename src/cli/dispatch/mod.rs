//! Maps validated CLI arguments to the action the binary runs.

use crate::cli::actions::{enroll::Args, Action};
use crate::cli::commands::{server, ARG_CACHE_TTL, ARG_STATE, ARG_USER};
use anyhow::Result;
use std::{path::PathBuf, time::Duration};

/// Map validated CLI matches to an enrollment action.
///
/// # Errors
/// Returns an error if arguments are inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let cache_ttl = matches
        .get_one::<u64>(ARG_CACHE_TTL)
        .copied()
        .map_or(crate::mfa::auth::DEFAULT_AUTH_TOKEN_TTL, Duration::from_secs);

    Ok(Action::Enroll(Args {
        config: server::Options::parse(matches),
        user: matches.get_one::<String>(ARG_USER).cloned(),
        state_path: matches.get_one::<PathBuf>(ARG_STATE).cloned(),
        cache_ttl,
    }))
}
