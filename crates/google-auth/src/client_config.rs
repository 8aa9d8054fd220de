//! OAuth client configuration
//!
//! Parsed from the client credentials JSON downloaded from the Google
//! Cloud console. Both the `installed` (desktop) and `web` layouts are
//! accepted; the first listed redirect URI is used unless overridden.

use common::Secret;
use serde::Deserialize;

use crate::constants::{AUTH_URI, TOKEN_URI};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl OAuthClientConfig {
    /// Parse a Google client credentials JSON document.
    pub fn from_credentials_json(json: &str, scopes: &[&str]) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| Error::ClientConfig(format!("parsing credentials JSON: {e}")))?;

        let section = file.web.or(file.installed).ok_or_else(|| {
            Error::ClientConfig("credentials JSON has neither \"web\" nor \"installed\"".into())
        })?;

        if section.client_id.is_empty() {
            return Err(Error::ClientConfig("client_id is empty".into()));
        }

        let redirect_uri = section.redirect_uris.into_iter().next().ok_or_else(|| {
            Error::ClientConfig("credentials JSON lists no redirect_uris".into())
        })?;

        Ok(Self {
            client_id: section.client_id,
            client_secret: Secret::new(section.client_secret),
            auth_uri: section.auth_uri.unwrap_or_else(|| AUTH_URI.to_string()),
            token_uri: section.token_uri.unwrap_or_else(|| TOKEN_URI.to_string()),
            redirect_uri,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Point the flow at a different callback (e.g. the gateway's
    /// `/oauth_callback` in redirect mode).
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }
}
