//! Shared fixtures: a local token endpoint and a client config pointing at it

use std::collections::HashMap;

use axum::extract::Form;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::Secret;
use serde_json::json;

use crate::client_config::OAuthClientConfig;

pub fn client_config(token_uri: &str) -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: "test-client.apps.googleusercontent.com".into(),
        client_secret: Secret::new("test-secret".into()),
        auth_uri: "https://accounts.google.com/o/oauth2/auth".into(),
        token_uri: token_uri.into(),
        redirect_uri: "http://localhost:8080/oauth_callback".into(),
        scopes: vec!["https://www.googleapis.com/auth/gmail.send".into()],
    }
}

/// Start a mock token endpoint and return its `/token` URL.
///
/// - `authorization_code` with code `good-code` succeeds, as does
///   `pkce-code` when a `code_verifier` is sent; other codes get
///   `invalid_grant`.
/// - `refresh_token` with `rt_valid` succeeds without a new refresh token;
///   others get `invalid_grant`.
pub async fn spawn_token_server() -> String {
    let app = Router::new().route("/token", post(token_endpoint));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/token")
}

fn code_accepted(form: &HashMap<String, String>) -> bool {
    match form.get("code").map(String::as_str) {
        Some("good-code") => true,
        Some("pkce-code") => form.get("code_verifier").is_some_and(|v| !v.is_empty()),
        _ => false,
    }
}

async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> Response {
    let grant = form.get("grant_type").map(String::as_str);
    match grant {
        Some("authorization_code") if code_accepted(&form) => {
            Json(json!({
                "access_token": "at_exchanged",
                "refresh_token": "rt_exchanged",
                "expires_in": 3600,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        Some("refresh_token")
            if form.get("refresh_token").map(String::as_str) == Some("rt_valid") =>
        {
            Json(json!({
                "access_token": "at_refreshed",
                "expires_in": 3600,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Bad Request"})),
        )
            .into_response(),
    }
}
