//! Session gate for the API routes
//!
//! A request passes with a valid `jwt` cookie. Without one the browser is
//! sent (307) to the login page, or to the OTP check page when a login is
//! already pending. A present but invalid or expired token also goes back
//! to login.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, error};

use crate::AppState;
use crate::routes::{
    CHECK_OTP_URL, LOGIN_URL, PENDING_AUTH_COOKIE, SESSION_COOKIE, chained_redirect, read_cookie,
};

pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let headers = request.headers();

    let Some(token) = read_cookie(headers, SESSION_COOKIE) else {
        let page = if read_cookie(headers, PENDING_AUTH_COOKIE).is_some() {
            CHECK_OTP_URL
        } else {
            LOGIN_URL
        };
        return Redirect::temporary(&chained_redirect(page, &path)).into_response();
    };

    match state.sessions.verify(&token) {
        Ok(claims) => {
            debug!(identity = %claims.sub, manager = claims.manager, "session accepted");
            next.run(request).await
        }
        Err(authenticator::Error::BlankSecret) => {
            error!("session secret is blank, cannot verify tokens");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error: JWT Secret not set.",
            )
                .into_response()
        }
        Err(e) => {
            debug!(error = %e, "session rejected");
            Redirect::temporary(&chained_redirect(LOGIN_URL, &path)).into_response()
        }
    }
}
