//! Error types for the OAuth handshake, token endpoint and token vault

/// Errors from delegated-access operations.
///
/// `Clone` because a handshake outcome is both delivered to the waiting
/// initiator and reported back to the callback handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("OAuth state parameter does not match the pending authorization")]
    StateMismatch,

    #[error("no OAuth authorization is pending")]
    NoPendingHandshake,

    #[error("OAuth authorization superseded by a newer one")]
    Abandoned,

    #[error("OAuth authorization wait cancelled")]
    Cancelled,

    #[error("OAuth authorization timed out after {0}s")]
    TimedOut(u64),

    #[error("invalid OAuth client config: {0}")]
    ClientConfig(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("no delegated token available; complete the OAuth authorization first")]
    NotAuthorized,
}

pub type Result<T> = std::result::Result<T, Error>;
