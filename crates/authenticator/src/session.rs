//! Stateless session tokens
//!
//! A session is an HS256 JWT carrying the identity, a manager flag and an
//! absolute expiry N calendar months from issuance. Nothing is stored
//! server-side; whoever holds the signing secret can verify a token.

use chrono::{DateTime, Months, Utc};
use common::Secret;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Signed claim set of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity (email local-part)
    pub sub: String,
    pub manager: bool,
    /// Expiration as unix timestamp in seconds
    pub exp: i64,
}

/// Mints and verifies session tokens with one symmetric secret.
pub struct SessionIssuer {
    secret: Secret<String>,
    lifetime_months: u32,
}

impl SessionIssuer {
    pub fn new(secret: Secret<String>, lifetime_months: u32) -> Self {
        Self {
            secret,
            lifetime_months,
        }
    }

    pub fn lifetime_months(&self) -> u32 {
        self.lifetime_months
    }

    /// Session expiry for a token issued at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_add_months(Months::new(self.lifetime_months))
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "session lifetime of {} months overflows",
                    self.lifetime_months
                ))
            })
    }

    /// Sign a session token for `identity`.
    pub fn issue(&self, identity: &str, is_manager: bool) -> Result<String> {
        if self.secret.is_blank() {
            return Err(Error::BlankSecret);
        }

        let claims = SessionClaims {
            sub: identity.to_string(),
            manager: is_manager,
            exp: self.expiry_from(Utc::now())?.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        debug!(identity, manager = is_manager, exp = claims.exp, "session token issued");
        Ok(token)
    }

    /// Check signature, algorithm and expiry of `token`.
    ///
    /// Only HS256 is accepted; tokens declaring any other algorithm
    /// (including `none`) fail before the signature is looked at.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        if self.secret.is_blank() {
            return Err(Error::BlankSecret);
        }

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}
