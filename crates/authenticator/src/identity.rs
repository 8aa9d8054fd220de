//! Email address splitting

use crate::error::{Error, Result};

/// Split an address at its final `@` into `(identity, domain)`.
///
/// The identity (local-part) is the credential store key. No further
/// RFC 5322 validation happens here; the HTTP layer parses addresses
/// before they reach the core.
pub fn split_address(email: &str) -> Result<(&str, &str)> {
    let at = email
        .rfind('@')
        .ok_or_else(|| Error::MalformedAddress(email.to_string()))?;
    Ok((&email[..at], &email[at + 1..]))
}

/// Identity (local-part) of an address.
pub fn identity_of(email: &str) -> Result<&str> {
    split_address(email).map(|(identity, _)| identity)
}
