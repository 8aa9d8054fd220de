//! Errors from the mail and spreadsheet capabilities

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("this service is not enabled")]
    Disabled,

    #[error("delegated access unavailable: {0}")]
    Auth(#[from] google_auth::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Google API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unknown sheet {0:?}")]
    UnknownSheet(String),

    #[error("invalid column number: {0}")]
    InvalidColumn(i64),

    #[error("invalid A1 range: {0:?}")]
    InvalidRange(String),

    #[error("invalid API response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
