//! Login, consent-callback and API handlers

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path, Query, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use chrono::Utc;
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;
use crate::metrics;

pub const SESSION_COOKIE: &str = "jwt";
pub const PENDING_AUTH_COOKIE: &str = "pendingauth";
pub const LOGIN_URL: &str = "/login/login.html";
pub const CHECK_OTP_URL: &str = "/login/checkotp.html";

/// How long the pending-auth cookie outlives the OTP mail.
const PENDING_AUTH_MAX_AGE_SECS: i64 = 3 * 60;

const OTP_SUBJECT: &str = "Codice di verifica";
const OTP_BODY_PREFIX: &str = "Ecco il tuo codice di verifica:\t";

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    #[serde(default)]
    redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct MailForm {
    #[serde(default)]
    mail: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpForm {
    #[serde(default)]
    otp: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

pub async fn root() -> &'static str {
    "App root"
}

pub async fn login_root() -> &'static str {
    "Login root"
}

pub async fn protected_root() -> &'static str {
    "Protected root"
}

/// `POST /login`: mail an OTP to the submitted address and send the
/// browser to the OTP check page.
pub async fn request_otp(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    form: Result<Form<MailForm>, FormRejection>,
) -> Result<Response, ApiError> {
    if !state.login_enabled {
        return Err(ApiError::Disabled);
    }
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let address = parse_address(&form.mail)?;

    let otp = state.otp.issue(&address).await?;
    metrics::record_otp_issued();

    state
        .mailer
        .send(OTP_SUBJECT, &address, &format!("{OTP_BODY_PREFIX}{otp}"))
        .await?;
    info!(mailer = state.mailer.id(), "OTP mail sent");

    let pending = cookie_header(PENDING_AUTH_COOKIE, &address, PENDING_AUTH_MAX_AGE_SECS);
    Ok((
        AppendHeaders([(SET_COOKIE, pending)]),
        Redirect::to(&chained_redirect(CHECK_OTP_URL, &query.redirect)),
    )
        .into_response())
}

/// `POST /login/checkotp`: trade a valid OTP for a session cookie.
pub async fn check_otp(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    headers: HeaderMap,
    form: Result<Form<OtpForm>, FormRejection>,
) -> Result<Response, ApiError> {
    if !state.login_enabled {
        return Err(ApiError::Disabled);
    }
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let otp: u64 = form
        .otp
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("otp is not a number: {:?}", form.otp)))?;

    let pending = read_cookie(&headers, PENDING_AUTH_COOKIE)
        .ok_or_else(|| ApiError::BadRequest("no authentication is pending".into()))?;
    let address = parse_address(&pending)?;
    let target = local_target(&query.redirect);

    let valid = match state.otp.verify_and_consume(&address, otp).await {
        Ok(valid) => valid,
        Err(e) => {
            metrics::record_otp_verified("error");
            return Err(e.into());
        }
    };

    if !valid {
        metrics::record_otp_verified("invalid");
        debug!("OTP rejected, back to the check page");
        return Ok(Redirect::to(&chained_redirect(CHECK_OTP_URL, &query.redirect)).into_response());
    }
    metrics::record_otp_verified("valid");

    let identity = authenticator::identity_of(&address)?;
    let token = state.sessions.issue(identity, false)?;
    let now = Utc::now();
    let max_age = (state.sessions.expiry_from(now)? - now).num_seconds();
    metrics::record_session_issued();
    info!(identity, "session started");

    Ok((
        AppendHeaders([
            (SET_COOKIE, cookie_header(SESSION_COOKIE, &token, max_age)),
            (SET_COOKIE, cookie_header(PENDING_AUTH_COOKIE, "", 0)),
        ]),
        Redirect::to(target),
    )
        .into_response())
}

/// `GET /oauth_callback`: hand the consent redirect to the coordinator.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let Some(google) = &state.google else {
        return Err(ApiError::Disabled);
    };

    match google.coordinator.complete(&query.state, &query.code).await {
        Ok(()) => {
            metrics::record_handshake("success");
            Ok((StatusCode::OK, "Authentication successful.").into_response())
        }
        Err(e) => {
            metrics::record_handshake(handshake_outcome(&e));
            Err(e.into())
        }
    }
}

/// `GET /api/v1/sheets/{sheet}`: tab titles of a configured spreadsheet.
pub async fn list_sheet_tabs(
    State(state): State<AppState>,
    Path(sheet): Path<String>,
) -> Result<Response, ApiError> {
    let Some(google) = &state.google else {
        return Err(ApiError::Disabled);
    };

    let spreadsheet_id = google.sheets.spreadsheet_id(&sheet)?;
    let tabs = google.sheets.list_sheets(spreadsheet_id).await?;
    let body = serde_json::json!({ "sheet": sheet, "tabs": tabs });
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response())
}

fn handshake_outcome(err: &google_auth::Error) -> &'static str {
    match err {
        google_auth::Error::StateMismatch => "state_mismatch",
        google_auth::Error::NoPendingHandshake => "not_pending",
        google_auth::Error::ExchangeFailed(_) => "exchange_failed",
        _ => "failed",
    }
}

/// Accept a bare address or `Display Name <address>`. Both halves of the
/// address must be RFC 5322 dot-atoms.
fn parse_address(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    let address = match (raw.rfind('<'), raw.strip_suffix('>')) {
        (Some(open), Some(inner)) => &inner[open + 1..],
        _ => raw,
    };

    let valid = match address.rsplit_once('@') {
        Some((local, domain)) => is_dot_atom(local) && is_dot_atom(domain),
        None => false,
    };
    if !valid {
        return Err(ApiError::BadRequest(format!("mail: invalid address {raw:?}")));
    }
    Ok(address.to_string())
}

fn is_dot_atom(s: &str) -> bool {
    s.split('.').all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

/// RFC 5322 `atext`: letters, digits and the printable non-specials.
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c)
}

/// `page?redirect=<target>` with the target form-encoded.
pub fn chained_redirect(page: &str, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{page}?redirect={encoded}")
}

/// Post-login destination. Only same-site paths that fit in a `Location`
/// header are followed.
fn local_target(target: &str) -> &str {
    if target.starts_with('/')
        && !target.starts_with("//")
        && !target.starts_with("/\\")
        && !target.chars().any(char::is_control)
    {
        target
    } else {
        "/"
    }
}

/// Non-empty value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// `Set-Cookie` value for an HttpOnly, SameSite=Lax cookie. A `max_age` of
/// 0 clears the cookie.
pub fn cookie_header(name: &str, value: &str, max_age_secs: i64) -> String {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::seconds(max_age_secs))
        .build()
        .to_string()
}
