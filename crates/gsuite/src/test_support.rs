//! Token source fixtures for API client tests

use std::sync::Arc;

use common::Secret;
use google_auth::{GoogleToken, OAuthClientConfig, TokenSource};

pub fn client_config() -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: "test-client".into(),
        client_secret: Secret::new("test-secret".into()),
        auth_uri: google_auth::AUTH_URI.into(),
        token_uri: "http://127.0.0.1:9/token".into(),
        redirect_uri: "http://localhost/oauth_callback".into(),
        scopes: vec![],
    }
}

/// A source holding a non-expiring `at_test` token.
pub async fn authorized_source() -> Arc<TokenSource> {
    let source = TokenSource::new(reqwest::Client::new(), client_config(), None);
    source
        .install(GoogleToken {
            access_token: "at_test".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
        })
        .await
        .unwrap();
    Arc::new(source)
}
