//! In-process app fixtures for route tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use authenticator::{CredentialStore, OtpAuthenticator, OtpSettings, SecretGenerator, SessionIssuer};
use axum::Router;
use axum::extract::Form;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use google_auth::{GoogleToken, HandshakeCoordinator, OAuthClientConfig, TokenSource};
use gsuite::{MailSender, SheetsClient, VEHICLE_SHEET};
use serde_json::json;

use crate::{AppState, GoogleServices, build_router};

struct FixedOtp;

impl SecretGenerator for FixedOtp {
    fn generate(&self, _length: usize) -> String {
        TestApp::OTP.to_string()
    }
}

/// Mailer that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
    fail_next: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl MailSender for RecordingMailer {
    fn id(&self) -> &str {
        "recording"
    }

    fn send<'a>(
        &'a self,
        subject: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = gsuite::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(gsuite::Error::Api {
                    status: 500,
                    body: "backend error".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.into(), recipient.into(), body.into()));
            Ok(())
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub const OTP: &'static str = "482913";
    pub const JWT_SECRET: &'static str = "test-jwt-secret";

    pub async fn new() -> Self {
        Self::build(true, Self::JWT_SECRET, None)
    }

    /// Google services switched off: login routes answer 501.
    pub async fn disabled() -> Self {
        Self::build(false, Self::JWT_SECRET, None)
    }

    pub async fn with_session_secret(secret: &str) -> Self {
        Self::build(true, secret, None)
    }

    /// Coordinator, token source and sheets client wired to a local mock
    /// of the Google endpoints.
    pub async fn with_google() -> Self {
        let base = spawn_google_mock().await;
        let config = OAuthClientConfig {
            client_id: "test-client".into(),
            client_secret: Secret::new("test-secret".into()),
            auth_uri: google_auth::AUTH_URI.into(),
            token_uri: format!("{base}/token"),
            redirect_uri: "http://localhost:8080/oauth_callback".into(),
            scopes: vec![google_auth::GMAIL_SEND_SCOPE.into()],
        };

        let client = reqwest::Client::new();
        let tokens = Arc::new(TokenSource::new(client.clone(), config.clone(), None));
        tokens
            .install(GoogleToken {
                access_token: "at_test".into(),
                token_type: "Bearer".into(),
                refresh_token: None,
                expiry: None,
            })
            .await
            .unwrap();

        let sheets = SheetsClient::with_api_base(
            client.clone(),
            tokens.clone(),
            HashMap::from([(VEHICLE_SHEET.to_string(), "vehicle-id".to_string())]),
            base,
        );

        let google = GoogleServices {
            coordinator: Arc::new(HandshakeCoordinator::new(client, config)),
            tokens,
            sheets: Arc::new(sheets),
        };
        Self::build(true, Self::JWT_SECRET, Some(google))
    }

    fn build(login_enabled: bool, jwt_secret: &str, google: Option<GoogleServices>) -> Self {
        let settings = OtpSettings::new("example.com", Self::OTP.len()).unwrap();
        let otp = OtpAuthenticator::new(settings, CredentialStore::new(Duration::from_secs(180)))
            .with_generator(FixedOtp);
        let mailer = Arc::new(RecordingMailer::default());

        let state = AppState {
            otp: Arc::new(otp),
            sessions: Arc::new(SessionIssuer::new(Secret::new(jwt_secret.to_string()), 1)),
            mailer: mailer.clone(),
            login_enabled,
            google,
            prometheus: metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
            started_at: Instant::now(),
        };
        Self { state, mailer }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), 100)
    }
}

pub async fn body_string(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Token endpoint accepting only `good-code`, and a spreadsheet metadata
/// endpoint with two tabs.
async fn spawn_google_mock() -> String {
    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route(
            "/spreadsheets/{id}",
            get(|| async {
                axum::Json(json!({"sheets": [
                    {"properties": {"title": "Veicoli"}},
                    {"properties": {"title": "Archivio"}}
                ]}))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("code").map(String::as_str) == Some("good-code") {
        return axum::Json(json!({
            "access_token": "at_exchanged",
            "refresh_token": "rt_exchanged",
            "expires_in": 3600,
            "token_type": "Bearer"
        }))
        .into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({"error": "invalid_grant"})),
    )
        .into_response()
}
