//! Delegated Google access
//!
//! Runs the OAuth2 consent handshake, exchanges and refreshes tokens, and
//! keeps the resulting token sealed in an AES-GCM vault. No dependency on
//! the HTTP gateway; the callback route only calls
//! [`HandshakeCoordinator::complete`].
//!
//! Token flow:
//! 1. `TokenSource::acquire()` restores the token from the vault if present
//! 2. Otherwise `HandshakeCoordinator` runs the manual or redirect handshake
//! 3. The redirect arrives at `/oauth_callback` → `HandshakeCoordinator::complete()`
//! 4. `TokenSource::install()` seals the token under `gtoken`
//! 5. `TokenSource::access_token()` refreshes it at request time

pub mod cipher;
pub mod client_config;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod pkce;
pub mod source;
pub mod token;
pub mod vault;

#[cfg(test)]
mod test_support;

pub use client_config::OAuthClientConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use handshake::{HandshakeCoordinator, InteractionMode, PendingHandshake};
pub use source::TokenSource;
pub use token::{GoogleToken, TokenResponse, exchange_code, refresh_token};
pub use vault::TokenVault;
