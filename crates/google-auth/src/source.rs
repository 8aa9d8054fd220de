//! Current delegated access token
//!
//! Hands out bearer values for outbound Google API calls, refreshing the
//! token at request time when it is about to expire. Every new token is
//! sealed into the vault so a restart does not need a fresh consent.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::BufReader;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client_config::OAuthClientConfig;
use crate::constants::VAULT_TOKEN_NAME;
use crate::error::{Error, Result};
use crate::handshake::{HandshakeCoordinator, InteractionMode};
use crate::token::{GoogleToken, refresh_token};
use crate::vault::TokenVault;

/// Refresh when the token has less than this left.
const REFRESH_MARGIN_SECS: i64 = 60;

pub struct TokenSource {
    client: reqwest::Client,
    config: OAuthClientConfig,
    vault: Option<Arc<TokenVault>>,
    token: RwLock<Option<GoogleToken>>,
}

impl TokenSource {
    pub fn new(
        client: reqwest::Client,
        config: OAuthClientConfig,
        vault: Option<Arc<TokenVault>>,
    ) -> Self {
        Self {
            client,
            config,
            vault,
            token: RwLock::new(None),
        }
    }

    /// Restore a token saved by a previous run. Returns whether one was found.
    pub async fn load_from_vault(&self) -> Result<bool> {
        let Some(vault) = &self.vault else {
            return Ok(false);
        };
        match vault.load_json::<GoogleToken>(VAULT_TOKEN_NAME).await? {
            Some(token) => {
                info!(expiry = ?token.expiry, "restored delegated token from vault");
                *self.token.write().await = Some(token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Adopt a freshly obtained token and persist it.
    pub async fn install(&self, token: GoogleToken) -> Result<()> {
        if let Some(vault) = &self.vault {
            vault.save_json(VAULT_TOKEN_NAME, &token).await?;
        }
        *self.token.write().await = Some(token);
        info!("delegated token installed");
        Ok(())
    }

    pub async fn is_authorized(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// `Authorization` header value, refreshed if within a minute of expiry.
    pub async fn access_token(&self) -> Result<String> {
        let margin = chrono::Duration::seconds(REFRESH_MARGIN_SECS);

        {
            let guard = self.token.read().await;
            match guard.as_ref() {
                None => return Err(Error::NotAuthorized),
                Some(token) if !token.expires_within(margin, Utc::now()) => {
                    return Ok(token.authorization_header());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent caller may have refreshed.
        let mut guard = self.token.write().await;
        let Some(current) = guard.as_ref() else {
            return Err(Error::NotAuthorized);
        };
        if !current.expires_within(margin, Utc::now()) {
            return Ok(current.authorization_header());
        }

        let Some(refresh) = current.refresh_token.clone() else {
            warn!("delegated token expired and has no refresh token");
            return Err(Error::InvalidCredentials(
                "access token expired and no refresh token is held".into(),
            ));
        };

        debug!("refreshing delegated token");
        let response = refresh_token(&self.client, &self.config, &refresh).await?;
        let mut refreshed = GoogleToken::from_response(response, Utc::now());
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh);
        }

        if let Some(vault) = &self.vault {
            if let Err(e) = vault.save_json(VAULT_TOKEN_NAME, &refreshed).await {
                warn!(error = %e, "failed to persist refreshed token");
            }
        }

        let header = refreshed.authorization_header();
        *guard = Some(refreshed);
        info!("delegated token refreshed");
        Ok(header)
    }

    /// Make sure a token is held: restore it from the vault, otherwise run
    /// the consent handshake in `mode`.
    ///
    /// Redirect mode waits for `/oauth_callback`, so the HTTP server must
    /// already be serving. `timeout` bounds that wait; `cancel` aborts it.
    pub async fn acquire(
        &self,
        coordinator: &HandshakeCoordinator,
        mode: InteractionMode,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.is_authorized().await || self.load_from_vault().await? {
            return Ok(());
        }

        let token = match mode {
            InteractionMode::Manual => {
                if !std::io::stdin().is_terminal() {
                    warn!("manual OAuth authorization reading from a non-terminal stdin");
                }
                coordinator
                    .run_manual(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                    .await?
            }
            InteractionMode::Redirect => {
                let pending = coordinator.begin().await?;
                info!(
                    url = %pending.authorization_url(),
                    "open this URL in a browser to authorize Google access"
                );
                pending.wait_bounded(cancel, timeout).await?
            }
        };

        self.install(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_config, spawn_token_server};

    const UNREACHABLE: &str = "http://127.0.0.1:9/token";

    fn token(expires_in_secs: i64, refresh: Option<&str>) -> GoogleToken {
        GoogleToken {
            access_token: "at_current".into(),
            token_type: "Bearer".into(),
            refresh_token: refresh.map(String::from),
            expiry: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
        }
    }

    fn source(token_uri: &str, vault: Option<Arc<TokenVault>>) -> TokenSource {
        TokenSource::new(reqwest::Client::new(), client_config(token_uri), vault)
    }

    async fn vault(dir: &tempfile::TempDir) -> Arc<TokenVault> {
        let key = TokenVault::key_from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        Arc::new(
            TokenVault::open(dir.path().join("vault.json"), key)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn no_token_is_not_authorized() {
        let source = source(UNREACHABLE, None);
        assert!(!source.is_authorized().await);
        assert!(matches!(source.access_token().await, Err(Error::NotAuthorized)));
    }

    #[tokio::test]
    async fn fresh_token_is_used_as_is() {
        let source = source(UNREACHABLE, None);
        source.install(token(3600, Some("rt_valid"))).await.unwrap();
        assert_eq!(source.access_token().await.unwrap(), "Bearer at_current");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_keeps_refresh_token() {
        let token_uri = spawn_token_server().await;
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir).await;
        let source = source(&token_uri, Some(vault.clone()));

        source.install(token(30, Some("rt_valid"))).await.unwrap();
        assert_eq!(source.access_token().await.unwrap(), "Bearer at_refreshed");

        let persisted: GoogleToken = vault.load_json(VAULT_TOKEN_NAME).await.unwrap().unwrap();
        assert_eq!(persisted.access_token, "at_refreshed");
        assert_eq!(persisted.refresh_token.as_deref(), Some("rt_valid"));
    }

    #[tokio::test]
    async fn revoked_refresh_token_surfaces_invalid_credentials() {
        let token_uri = spawn_token_server().await;
        let source = source(&token_uri, None);
        source.install(token(-10, Some("rt_revoked"))).await.unwrap();

        let err = source.access_token().await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token() {
        let source = source(UNREACHABLE, None);
        source.install(token(-10, None)).await.unwrap();
        assert!(matches!(
            source.access_token().await,
            Err(Error::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn token_survives_restart_via_vault() {
        let dir = tempfile::tempdir().unwrap();
        let first = source(UNREACHABLE, Some(vault(&dir).await));
        first.install(token(3600, Some("rt_valid"))).await.unwrap();

        let second = source(UNREACHABLE, Some(vault(&dir).await));
        assert!(second.load_from_vault().await.unwrap());
        assert_eq!(second.access_token().await.unwrap(), "Bearer at_current");
    }

    #[tokio::test]
    async fn acquire_uses_vault_before_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let seeded = vault(&dir).await;
        seeded.save_json(VAULT_TOKEN_NAME, &token(3600, None)).await.unwrap();

        let config = client_config(UNREACHABLE);
        let coordinator = HandshakeCoordinator::new(reqwest::Client::new(), config.clone());
        let source = TokenSource::new(reqwest::Client::new(), config, Some(vault(&dir).await));

        source
            .acquire(&coordinator, InteractionMode::Redirect, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(source.is_authorized().await);
        assert!(!coordinator.is_pending().await);
    }

    #[tokio::test]
    async fn acquire_redirect_mode_installs_delivered_token() {
        let token_uri = spawn_token_server().await;
        let config = client_config(&token_uri);
        let coordinator = Arc::new(HandshakeCoordinator::new(reqwest::Client::new(), config.clone()));
        let source = Arc::new(TokenSource::new(reqwest::Client::new(), config, None));

        let task = {
            let coordinator = coordinator.clone();
            let source = source.clone();
            tokio::spawn(async move {
                source
                    .acquire(
                        &coordinator,
                        InteractionMode::Redirect,
                        Some(Duration::from_secs(5)),
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        // Stand in for the browser: wait until the URL is published, then call back.
        let state = loop {
            if let Some(state) = coordinator.pending_state().await {
                break state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        coordinator.complete(&state, "pkce-code").await.unwrap();

        task.await.unwrap().unwrap();
        assert_eq!(source.access_token().await.unwrap(), "Bearer at_exchanged");
    }

    #[tokio::test]
    async fn acquire_redirect_mode_times_out() {
        let config = client_config(UNREACHABLE);
        let coordinator = HandshakeCoordinator::new(reqwest::Client::new(), config.clone());
        let source = TokenSource::new(reqwest::Client::new(), config, None);

        let err = source
            .acquire(
                &coordinator,
                InteractionMode::Redirect,
                Some(Duration::from_millis(20)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut(_)), "got {err:?}");
        assert!(!source.is_authorized().await);
        assert!(!coordinator.is_pending().await);
    }
}
