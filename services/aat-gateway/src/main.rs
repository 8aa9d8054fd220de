//! AAT manager gateway
//!
//! Single-binary service that:
//! 1. Logs users in with a one-time password mailed to their address
//! 2. Hands out HS256 session cookies and guards `/api/v1` with them
//! 3. Holds delegated Google access (Gmail, Sheets) obtained through an
//!    OAuth2 consent handshake, sealed in an encrypted vault between runs

mod config;
mod error;
mod metrics;
mod middleware;
mod routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use authenticator::{CredentialStore, OtpAuthenticator, SessionIssuer};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use common::Secret;
use google_auth::{
    GMAIL_SEND_SCOPE, HandshakeCoordinator, InteractionMode, OAuthClientConfig, SPREADSHEETS_SCOPE,
    TokenSource, TokenVault,
};
use gsuite::{DisabledMailer, GmailSender, MailSender, SheetsClient};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, GoogleConfig, SheetsConfig};

/// Graceful shutdown budget for in-flight requests
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    otp: Arc<OtpAuthenticator>,
    sessions: Arc<SessionIssuer>,
    mailer: Arc<dyn MailSender>,
    /// Login needs mail delivery; without Google services it answers 501
    login_enabled: bool,
    google: Option<GoogleServices>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Delegated Google access, present only when enabled in config
#[derive(Clone)]
struct GoogleServices {
    coordinator: Arc<HandshakeCoordinator>,
    tokens: Arc<TokenSource>,
    sheets: Arc<SheetsClient>,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let protected = Router::new()
        .route("/api/v1", get(routes::protected_root))
        .route("/api/v1/", get(routes::protected_root))
        .route("/api/v1/sheets/{sheet}", get(routes::list_sheet_tabs))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .route("/", get(routes::root))
        .route("/login", get(routes::login_root).post(routes::request_otp))
        .route("/login/", get(routes::login_root).post(routes::request_otp))
        .route("/login/checkotp", post(routes::check_otp))
        .route("/oauth_callback", get(routes::oauth_callback))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting aat-manager");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        authorized_domain = %config.auth.authorized_domain,
        otp_length = config.auth.otp_length,
        session_lifetime_months = config.auth.session_lifetime_months,
        google_enabled = config.google.enabled,
        interaction_mode = ?config.google.interaction_mode,
        "configuration loaded"
    );

    let otp = OtpAuthenticator::new(
        config.auth.otp_settings()?,
        CredentialStore::new(Duration::from_secs(config.auth.otp_ttl_secs)),
    );

    let jwt_secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
        warn!("no JWT secret configured, session issuance will fail");
        Secret::new(String::new())
    });
    let sessions = SessionIssuer::new(jwt_secret, config.auth.session_lifetime_months);

    let client = reqwest::Client::new();
    let google = if config.google.enabled {
        Some(google_services(&config.google, &config.sheets, client.clone()).await?)
    } else {
        info!("Google services disabled, login routes will answer 501");
        None
    };

    let mailer: Arc<dyn MailSender> = match &google {
        Some(google) => Arc::new(GmailSender::new(client.clone(), google.tokens.clone())),
        None => Arc::new(DisabledMailer),
    };

    // Manual consent reads the code from the terminal before serving
    let cancel = CancellationToken::new();
    if let Some(google) = &google {
        if config.google.interaction_mode == InteractionMode::Manual {
            google
                .tokens
                .acquire(&google.coordinator, InteractionMode::Manual, None, &cancel)
                .await
                .context("Google authorization failed")?;
        }
    }

    let app_state = AppState {
        otp: Arc::new(otp),
        sessions: Arc::new(sessions),
        mailer,
        login_enabled: config.google.enabled,
        google: google.clone(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // Redirect consent needs /oauth_callback, so it starts once we listen
    let consent_task = match &google {
        Some(google) if config.google.interaction_mode == InteractionMode::Redirect => {
            let google = google.clone();
            let cancel = cancel.clone();
            let timeout = (config.google.handshake_timeout_secs > 0)
                .then(|| Duration::from_secs(config.google.handshake_timeout_secs));
            Some(tokio::spawn(async move {
                match google
                    .tokens
                    .acquire(&google.coordinator, InteractionMode::Redirect, timeout, &cancel)
                    .await
                {
                    Ok(()) => info!("Google access authorized"),
                    Err(e) => error!(error = %e, "Google authorization failed, mail delivery unavailable"),
                }
            }))
        }
        _ => None,
    };

    // Graceful shutdown: the drain timeout starts when the signal fires
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Wake a pending consent wait so it clears its slot
    cancel.cancel();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if let Some(task) = consent_task {
        let _ = task.await;
    }

    info!("shutdown complete");
    Ok(())
}

/// Wire the OAuth client, token vault, token source and API clients.
async fn google_services(
    google: &GoogleConfig,
    sheets: &SheetsConfig,
    client: reqwest::Client,
) -> Result<GoogleServices> {
    let credentials = google
        .credentials_json
        .as_ref()
        .context("GOOGLE_CREDENTIAL is required when Google services are enabled")?;
    let mut oauth = OAuthClientConfig::from_credentials_json(
        credentials.expose(),
        &[GMAIL_SEND_SCOPE, SPREADSHEETS_SCOPE],
    )
    .context("invalid OAuth client credentials")?;
    if let Some(redirect_uri) = &google.redirect_uri {
        oauth = oauth.with_redirect_uri(redirect_uri.clone());
    }

    let key_hex = google
        .vault_key
        .as_ref()
        .context("AES_SECRET is required when Google services are enabled")?;
    let key = TokenVault::key_from_hex(key_hex.expose()).context("invalid AES_SECRET")?;
    let vault = TokenVault::open(google.vault_path.clone(), key)
        .await
        .with_context(|| format!("failed to open token vault {}", google.vault_path.display()))?;
    info!(path = %vault.path().display(), "token vault opened");

    let tokens = Arc::new(TokenSource::new(
        client.clone(),
        oauth.clone(),
        Some(Arc::new(vault)),
    ));
    let spreadsheets = sheets.spreadsheets();
    if spreadsheets.is_empty() {
        warn!("no spreadsheet IDs configured");
    }

    Ok(GoogleServices {
        coordinator: Arc::new(HandshakeCoordinator::new(client.clone(), oauth)),
        sheets: Arc::new(SheetsClient::new(client, tokens.clone(), spreadsheets)),
        tokens,
    })
}

/// Health endpoint: uptime and the state of delegated Google access.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();

    let google = match &state.google {
        None => "disabled",
        Some(google) => {
            if google.tokens.is_authorized().await {
                "authorized"
            } else if google.coordinator.is_pending().await {
                "awaiting_consent"
            } else {
                "unauthorized"
            }
        }
    };

    let body = serde_json::json!({
        "status": "healthy",
        "login_enabled": state.login_enabled,
        "google": google,
        "uptime_seconds": uptime,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
