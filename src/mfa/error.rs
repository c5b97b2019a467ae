use thiserror::Error;

/// Failures talking to the MFA server.
///
/// `Clone` so the auth-token cache can hand the same failure to every caller
/// waiting on a shared fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The request never completed (connect, TLS, timeout).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The server answered, but not with the JSON shape we need.
    #[error("unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("missing user attribute: {0}")]
    MissingAttribute(String),
}

impl Error {
    pub(crate) fn protocol(url: &str, message: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self::Transport {
            url: url.to_string(),
            message,
        }
    }

    /// Errors that the surrounding SSO flow should present as a bad request.
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::MissingAttribute(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_message_names_url() {
        let err = Error::protocol("https://pi.example.org/token/", "no count found");
        assert_eq!(
            err.to_string(),
            "unexpected response from https://pi.example.org/token/: no count found"
        );
        assert!(err.is_bad_request());
    }

    #[test]
    fn config_error_is_not_bad_request() {
        assert!(!Error::Config("no host".to_string()).is_bad_request());
    }
}
