//! Client side of the MFA server's management API.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod inventory;

pub use self::auth::{AuthToken, AuthTokenCache};
pub use self::client::{ApiResponse, MfaClient};
pub use self::config::{ResolvedConfig, ServerConfig, TokenType};
pub use self::error::{Error, Result};
