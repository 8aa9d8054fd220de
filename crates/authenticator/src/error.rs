//! Error types for OTP and session operations

/// Errors from the authentication core.
///
/// Variants split into two classes: configuration faults an operator must
/// fix (`InvalidConfiguration`, `BlankSecret`, `Signing`) and per-request
/// input faults that are expected at volume (`MalformedAddress`,
/// `UnauthorizedDomain`, `IdentityNotFound`). A wrong OTP is not an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed mail address: {0}")]
    MalformedAddress(String),

    #[error("domain not authorized: {0}")]
    UnauthorizedDomain(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no pending OTP for identity {0}")]
    IdentityNotFound(String),

    #[error("blank secret key used")]
    BlankSecret,

    #[error("session token error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    /// Operator-facing misconfiguration: alert on these.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfiguration(_) | Error::BlankSecret | Error::Signing(_)
        )
    }

    /// Caller-supplied bad input: safe to count and ignore.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Error::MalformedAddress(_) | Error::UnauthorizedDomain(_) | Error::IdentityNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_disjoint() {
        let all = [
            Error::MalformedAddress("x".into()),
            Error::UnauthorizedDomain("y".into()),
            Error::InvalidConfiguration("z".into()),
            Error::IdentityNotFound("u".into()),
            Error::BlankSecret,
        ];
        for err in &all {
            assert_ne!(
                err.is_configuration(),
                err.is_user_input(),
                "{err:?} must belong to exactly one class"
            );
        }
    }

    #[test]
    fn blank_secret_message() {
        assert_eq!(Error::BlankSecret.to_string(), "blank secret key used");
    }
}
