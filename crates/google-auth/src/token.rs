//! OAuth token exchange and refresh
//!
//! Both operations POST form-encoded requests to the client's token
//! endpoint with different grant types. Google omits `refresh_token` on
//! refresh responses, so callers keep the one they already hold.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::client_config::OAuthClientConfig;
use crate::error::{Error, Result};

/// Raw token endpoint response.
///
/// `expires_in` is a delta in seconds; `GoogleToken` turns it into an
/// absolute expiry.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Delegated Google token as kept in memory and in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl GoogleToken {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: response.refresh_token,
            expiry: response.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// True if the token expires within `margin` of `now`. Tokens without
    /// an expiry never need refreshing.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry - margin <= now)
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Exchange an authorization code for tokens.
///
/// `verifier` is the PKCE verifier of the flow that produced the code.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    code: &str,
    verifier: Option<&str>,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.expose().as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];
    if let Some(verifier) = verifier {
        form.push(("code_verifier", verifier));
    }

    let response = client
        .post(&config.token_uri)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::ExchangeFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid token response: {e}")))
}

/// Refresh an access token.
///
/// A revoked or expired refresh token comes back as `invalid_grant`; that
/// and 401/403 map to `InvalidCredentials` so the caller knows a new
/// consent is required.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&config.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 || body.contains("invalid_grant") {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::ExchangeFailed(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid refresh response: {e}")))
}
