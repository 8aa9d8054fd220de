//! Request-level errors and their HTTP mapping
//!
//! Handlers return `Result<_, ApiError>`; the mapping to status codes lives
//! in one place so every route answers the same way for the same failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] authenticator::Error),

    #[error(transparent)]
    Gsuite(#[from] gsuite::Error),

    #[error(transparent)]
    Handshake(#[from] google_auth::Error),

    /// Missing or unparseable form field / cookie
    #[error("{0}")]
    BadRequest(String),

    #[error("This service is not enabled.")]
    Disabled,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) if e.is_configuration() => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::BAD_REQUEST,
            ApiError::Gsuite(gsuite::Error::Disabled) | ApiError::Disabled => {
                StatusCode::NOT_IMPLEMENTED
            }
            ApiError::Gsuite(gsuite::Error::UnknownSheet(_)) => StatusCode::NOT_FOUND,
            ApiError::Gsuite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Handshake(
                google_auth::Error::StateMismatch | google_auth::Error::NoPendingHandshake,
            ) => StatusCode::BAD_REQUEST,
            ApiError::Handshake(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Body sent to the client. Server-side failures keep their detail in
    /// the log only, except token exchange errors which name the cause.
    fn public_message(&self) -> String {
        match self {
            ApiError::Gsuite(gsuite::Error::Disabled) | ApiError::Disabled => {
                ApiError::Disabled.to_string()
            }
            ApiError::Handshake(google_auth::Error::StateMismatch) => {
                "Invalid state parameter.".into()
            }
            ApiError::Handshake(google_auth::Error::ExchangeFailed(detail)) => {
                format!("Failed to exchange token: {detail}")
            }
            e if e.status().is_server_error() => "Internal server error.".into(),
            e => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn user_input_errors_are_bad_request() {
        for err in [
            authenticator::Error::MalformedAddress("nobody".into()),
            authenticator::Error::UnauthorizedDomain("evil.com".into()),
            authenticator::Error::IdentityNotFound("mario".into()),
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(
            ApiError::BadRequest("otp is not a number".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn configuration_errors_are_internal() {
        for err in [
            authenticator::Error::InvalidConfiguration("otp length".into()),
            authenticator::Error::BlankSecret,
        ] {
            assert_eq!(
                ApiError::from(err).status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[tokio::test]
    async fn disabled_mail_is_not_implemented() {
        let (status, body) = body_of(ApiError::from(gsuite::Error::Disabled)).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body, "This service is not enabled.");
    }

    #[tokio::test]
    async fn mail_failure_hides_detail() {
        let err = gsuite::Error::Api {
            status: 403,
            body: "quota exceeded for project 1234".into(),
        };
        let (status, body) = body_of(ApiError::from(err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("1234"), "got: {body}");
    }

    #[test]
    fn unknown_sheet_is_not_found() {
        let err = ApiError::from(gsuite::Error::UnknownSheet("fuelSheet".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handshake_errors_match_callback_contract() {
        let (status, body) = body_of(ApiError::from(google_auth::Error::StateMismatch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid state parameter.");

        let (status, body) =
            body_of(ApiError::from(google_auth::Error::ExchangeFailed("invalid_grant".into())))
                .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Failed to exchange token: invalid_grant");

        let (status, _) = body_of(ApiError::from(google_auth::Error::NoPendingHandshake)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
