//! PKCE (RFC 7636) and authorization URL construction
//!
//! The verifier stays with the pending handshake and is sent during the
//! code exchange; only its S256 challenge goes into the browser URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::client_config::OAuthClientConfig;
use crate::error::{Error, Result};

/// Random bytes behind a verifier. 64 bytes encode to 86 characters,
/// inside RFC 7636's 43..=128 window.
const VERIFIER_BYTES: usize = 64;

pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Build the consent URL the user's browser is sent to.
///
/// Always requests offline access so the exchange yields a refresh token.
/// `challenge` is omitted for the manual flow when no verifier is kept.
pub fn build_authorization_url(
    config: &OAuthClientConfig,
    state: &str,
    challenge: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse(&config.auth_uri)
        .map_err(|e| Error::ClientConfig(format!("invalid auth_uri {}: {e}", config.auth_uri)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("access_type", "offline")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("state", state);
        if let Some(challenge) = challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }

    Ok(url.into())
}
