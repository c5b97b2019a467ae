//! Token kinds offered in a multi-challenge answer from `/validate/check`.
//!
//! The login step that follows enrollment needs to know whether to render a
//! U2F prompt, an OTP field or both.

use crate::{
    enrollment::state::{SsoState, CHECK_TOKEN_TYPE_KEY},
    mfa::error::{Error, Result},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTypes {
    pub use_u2f: bool,
    pub use_otp: bool,
}

#[derive(Debug, Deserialize)]
struct ChallengeDetail {
    #[serde(default)]
    transaction_id: Value,
    multi_challenge: Vec<Value>,
}

/// Record which token kinds the challenge in `body` asks for.
///
/// # Errors
/// Returns `Error::Protocol` if `body` has no `detail.multi_challenge` list.
pub fn check_token_type(state: &mut SsoState, body: &Value) -> Result<TokenTypes> {
    let detail = body
        .get("detail")
        .ok_or_else(|| Error::protocol("/validate/check", "no detail found"))
        .and_then(|detail| {
            ChallengeDetail::deserialize(detail).map_err(|e| {
                Error::protocol("/validate/check", format!("invalid multi_challenge: {e}"))
            })
        })?;

    let mut types = TokenTypes::default();
    for challenge in &detail.multi_challenge {
        if challenge.get("type").and_then(Value::as_str) == Some("u2f") {
            types.use_u2f = true;
        } else {
            types.use_otp = true;
        }
    }

    if types.use_u2f {
        debug!("The user has u2f token");
    }
    if types.use_otp {
        debug!("The user has otp token");
    }

    state.merge_section(
        CHECK_TOKEN_TYPE_KEY,
        [
            ("transaction_id", detail.transaction_id),
            ("multi_challenge", Value::Array(detail.multi_challenge)),
            ("use_u2f", Value::Bool(types.use_u2f)),
            ("use_otp", Value::Bool(types.use_otp)),
        ],
    );

    Ok(types)
}
