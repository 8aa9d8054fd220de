//! Outbound mail
//!
//! `MailSender` is the capability the login flow needs: deliver one short
//! text message. `GmailSender` implements it over the Gmail REST API with
//! the delegated token; `DisabledMailer` stands in when Google services are
//! switched off.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use google_auth::TokenSource;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Mail delivery.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn MailSender>`).
pub trait MailSender: Send + Sync {
    /// Identifier for logging (e.g. "gmail", "disabled")
    fn id(&self) -> &str;

    fn send<'a>(
        &'a self,
        subject: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// RFC 822 message with `To` and `Subject` headers and a plain body.
pub fn build_message(subject: &str, recipient: &str, body: &str) -> String {
    format!("To: {recipient}\r\nSubject: {subject}\r\n\r\n{body}")
}

/// Sends as the authorizing account (`users/me`).
pub struct GmailSender {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<TokenSource>,
}

impl GmailSender {
    pub fn new(client: reqwest::Client, tokens: Arc<TokenSource>) -> Self {
        Self::with_api_base(client, tokens, GMAIL_API_BASE)
    }

    pub fn with_api_base(
        client: reqwest::Client,
        tokens: Arc<TokenSource>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn deliver(&self, subject: &str, recipient: &str, body: &str) -> Result<()> {
        let raw = URL_SAFE.encode(build_message(subject, recipient, body));
        let bearer = self.tokens.access_token().await?;

        let response = self
            .client
            .post(format!("{}/users/me/messages/send", self.api_base))
            .header(AUTHORIZATION, bearer)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("gmail send request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(status = status.as_u16(), "gmail rejected message");
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(recipient, "mail sent");
        Ok(())
    }
}

impl MailSender for GmailSender {
    fn id(&self) -> &str {
        "gmail"
    }

    fn send<'a>(
        &'a self,
        subject: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.deliver(subject, recipient, body))
    }
}

/// Always fails with `Disabled`.
pub struct DisabledMailer;

impl MailSender for DisabledMailer {
    fn id(&self) -> &str {
        "disabled"
    }

    fn send<'a>(
        &'a self,
        _subject: &'a str,
        _recipient: &'a str,
        _body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Err(Error::Disabled) })
    }
}
