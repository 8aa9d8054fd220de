//! OAuth2 authorization-code handshake
//!
//! Two ways to get the user's consent:
//!
//! - **Manual**: print the consent URL, read the pasted code from an input
//!   stream, exchange it immediately.
//! - **Redirect**: publish the consent URL and park the initiator on a
//!   one-shot channel until the browser redirect reaches `/oauth_callback`.
//!
//! The redirect side is single-flight. The coordinator tracks at most one
//! pending authorization; beginning a new one wakes the previous waiter
//! with `Abandoned`. The expected state and the waiter live in the same
//! mutex, so a callback can never pair a code with a stale waiter.
//!
//! Transitions are computed by the pure [`handle_event`]; the coordinator
//! performs the I/O each action implies.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client_config::OAuthClientConfig;
use crate::constants::MANUAL_STATE;
use crate::error::{Error, Result};
use crate::pkce::{build_authorization_url, compute_challenge, generate_verifier};
use crate::token::{GoogleToken, exchange_code};

type Waiter = oneshot::Sender<Result<GoogleToken>>;

/// How the consent step reaches the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Manual,
    Redirect,
}

/// Pending-authorization register.
#[derive(Debug, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    AwaitingRedirect {
        expected_state: String,
        verifier: String,
        waiter: Waiter,
    },
}

#[derive(Debug)]
pub enum HandshakeEvent {
    /// A new authorization URL was published
    Begin {
        state: String,
        verifier: String,
        waiter: Waiter,
    },
    /// The browser redirect arrived with this `state`
    Callback { state: String },
    /// The initiator gave up on the authorization it started with `state`
    WaiterGone { state: String },
}

#[derive(Debug)]
pub enum HandshakeAction {
    /// Exchange the callback's code and hand the outcome to `waiter`
    Exchange { verifier: String, waiter: Waiter },
    /// Wake a superseded waiter with `Abandoned`
    Abandon { waiter: Waiter },
    /// Refuse the callback
    Reject(Error),
    None,
}

/// Handle a transition. Pure function: no I/O.
pub fn handle_event(state: HandshakeState, event: HandshakeEvent) -> (HandshakeState, HandshakeAction) {
    match (state, event) {
        (
            HandshakeState::Idle,
            HandshakeEvent::Begin {
                state,
                verifier,
                waiter,
            },
        ) => (
            HandshakeState::AwaitingRedirect {
                expected_state: state,
                verifier,
                waiter,
            },
            HandshakeAction::None,
        ),

        (
            HandshakeState::AwaitingRedirect { waiter: old, .. },
            HandshakeEvent::Begin {
                state,
                verifier,
                waiter,
            },
        ) => (
            HandshakeState::AwaitingRedirect {
                expected_state: state,
                verifier,
                waiter,
            },
            HandshakeAction::Abandon { waiter: old },
        ),

        (
            HandshakeState::AwaitingRedirect {
                expected_state,
                verifier,
                waiter,
            },
            HandshakeEvent::Callback { state },
        ) if state == expected_state => (
            HandshakeState::Idle,
            HandshakeAction::Exchange { verifier, waiter },
        ),

        (pending @ HandshakeState::AwaitingRedirect { .. }, HandshakeEvent::Callback { .. }) => {
            (pending, HandshakeAction::Reject(Error::StateMismatch))
        }

        (HandshakeState::Idle, HandshakeEvent::Callback { .. }) => (
            HandshakeState::Idle,
            HandshakeAction::Reject(Error::NoPendingHandshake),
        ),

        (
            HandshakeState::AwaitingRedirect { expected_state, .. },
            HandshakeEvent::WaiterGone { state },
        ) if state == expected_state => (HandshakeState::Idle, HandshakeAction::None),

        // Someone else's handshake is pending now; leave it alone.
        (state, HandshakeEvent::WaiterGone { .. }) => (state, HandshakeAction::None),
    }
}

/// Drives the consent handshake for one OAuth client.
///
/// Shared via `Arc` between the code that needs a token and the callback
/// route.
pub struct HandshakeCoordinator {
    client: reqwest::Client,
    config: OAuthClientConfig,
    slot: Arc<Mutex<HandshakeState>>,
}

impl HandshakeCoordinator {
    pub fn new(client: reqwest::Client, config: OAuthClientConfig) -> Self {
        Self {
            client,
            config,
            slot: Arc::new(Mutex::new(HandshakeState::Idle)),
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    pub async fn is_pending(&self) -> bool {
        self.pending_state().await.is_some()
    }

    /// State value of the authorization currently awaiting its redirect.
    pub async fn pending_state(&self) -> Option<String> {
        match &*self.slot.lock().await {
            HandshakeState::AwaitingRedirect { expected_state, .. } => Some(expected_state.clone()),
            HandshakeState::Idle => None,
        }
    }

    /// Publish a new redirect-mode authorization.
    ///
    /// Any authorization still pending is abandoned.
    pub async fn begin(&self) -> Result<PendingHandshake> {
        let state = redirect_state();
        let verifier = generate_verifier();
        let authorization_url =
            build_authorization_url(&self.config, &state, Some(&compute_challenge(&verifier)))?;
        let (waiter, receiver) = oneshot::channel();

        let action = transition(
            &self.slot,
            HandshakeEvent::Begin {
                state: state.clone(),
                verifier,
                waiter,
            },
        )
        .await;

        if let HandshakeAction::Abandon { waiter } = action {
            warn!("superseding pending OAuth authorization");
            // The old initiator may already be gone.
            let _ = waiter.send(Err(Error::Abandoned));
        }

        info!(state = %state, "OAuth authorization pending");
        Ok(PendingHandshake {
            authorization_url,
            state,
            receiver,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Deliver a browser redirect.
    ///
    /// On a state match the code is exchanged and the outcome goes to the
    /// waiter. The same outcome, minus the token, is returned for the HTTP
    /// response.
    pub async fn complete(&self, state: &str, code: &str) -> Result<()> {
        let action = transition(
            &self.slot,
            HandshakeEvent::Callback {
                state: state.to_string(),
            },
        )
        .await;

        match action {
            HandshakeAction::Exchange { verifier, waiter } => {
                let outcome = exchange_code(&self.client, &self.config, code, Some(&verifier))
                    .await
                    .map(|response| GoogleToken::from_response(response, Utc::now()))
                    .map_err(|e| match e {
                        Error::ExchangeFailed(_) => e,
                        other => Error::ExchangeFailed(other.to_string()),
                    });

                let reported = match &outcome {
                    Ok(_) => Ok(()),
                    Err(e) => Err(e.clone()),
                };
                if waiter.send(outcome).is_err() {
                    warn!("OAuth initiator stopped waiting; token discarded");
                }
                reported
            }
            HandshakeAction::Reject(e) => {
                warn!(state, error = %e, "rejected OAuth callback");
                Err(e)
            }
            HandshakeAction::Abandon { .. } | HandshakeAction::None => Ok(()),
        }
    }

    /// Manual flow: print the consent URL to `output`, read one code line
    /// from `input`, exchange it.
    pub async fn run_manual<R, W>(&self, mut input: R, mut output: W) -> Result<GoogleToken>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let url = build_authorization_url(&self.config, MANUAL_STATE, None)?;
        let prompt = format!(
            "Go to the following link in your browser then type the authorization code:\n{url}\n"
        );
        output
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing authorization prompt: {e}")))?;
        output
            .flush()
            .await
            .map_err(|e| Error::Io(format!("flushing authorization prompt: {e}")))?;

        let mut line = String::new();
        input
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Io(format!("reading authorization code: {e}")))?;
        let code = line.trim();
        if code.is_empty() {
            return Err(Error::ExchangeFailed("no authorization code entered".into()));
        }

        let response = exchange_code(&self.client, &self.config, code, None).await?;
        info!("manual OAuth authorization complete");
        Ok(GoogleToken::from_response(response, Utc::now()))
    }
}

async fn transition(slot: &Mutex<HandshakeState>, event: HandshakeEvent) -> HandshakeAction {
    let mut guard = slot.lock().await;
    let (next, action) = handle_event(std::mem::take(&mut *guard), event);
    *guard = next;
    action
}

/// `st<unix-nanos>`
fn redirect_state() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("st{nanos}")
}

/// A published authorization whose outcome has not arrived yet.
#[derive(Debug)]
pub struct PendingHandshake {
    authorization_url: String,
    state: String,
    receiver: oneshot::Receiver<Result<GoogleToken>>,
    slot: Arc<Mutex<HandshakeState>>,
}

impl PendingHandshake {
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Wait for the callback with no bound.
    pub async fn wait(self) -> Result<GoogleToken> {
        self.receiver.await.unwrap_or(Err(Error::Abandoned))
    }

    /// Wait until the callback arrives or `cancel` fires.
    pub async fn wait_cancellable(self, cancel: &CancellationToken) -> Result<GoogleToken> {
        self.wait_bounded(cancel, None).await
    }

    /// Wait at most `timeout` for the callback.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<GoogleToken> {
        self.wait_bounded(&CancellationToken::new(), Some(timeout)).await
    }

    /// Wait for the callback, giving up on `cancel` or after `timeout`.
    ///
    /// Giving up clears the coordinator's slot if it still holds this
    /// authorization, so a late callback is answered `NoPendingHandshake`.
    pub async fn wait_bounded(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<GoogleToken> {
        let Self {
            state,
            receiver,
            slot,
            ..
        } = self;

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let gave_up = tokio::select! {
            outcome = receiver => return outcome.unwrap_or(Err(Error::Abandoned)),
            _ = cancel.cancelled() => Error::Cancelled,
            _ = deadline => Error::TimedOut(timeout.map(|t| t.as_secs()).unwrap_or_default()),
        };

        info!(state = %state, reason = %gave_up, "stopped waiting for OAuth callback");
        transition(&slot, HandshakeEvent::WaiterGone { state }).await;
        Err(gave_up)
    }
}
