//! OTP issuance and verification
//!
//! Login flow:
//! 1. `issue()` checks the address domain, mints a digit OTP and stores it
//!    under the identity (local-part), replacing any earlier pending OTP
//! 2. The caller mails the OTP out of band
//! 3. `verify_and_consume()` compares the submitted code numerically and
//!    deletes the entry on a match; a mismatch leaves it for another try
//!    until it expires

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::generator::{DigitGenerator, SecretGenerator};
use crate::identity::{identity_of, split_address};
use crate::store::CredentialStore;

/// Longest OTP whose numeric value always fits in a `u64`.
pub const MAX_OTP_LENGTH: usize = 19;

/// Domain and length policy for issued OTPs.
#[derive(Debug, Clone)]
pub struct OtpSettings {
    /// Only addresses in this domain may log in (case-sensitive match)
    pub authorized_domain: String,
    pub otp_length: usize,
}

impl OtpSettings {
    /// Validated settings. An empty domain or a length outside
    /// `1..=MAX_OTP_LENGTH` is `InvalidConfiguration`.
    pub fn new(authorized_domain: impl Into<String>, otp_length: usize) -> Result<Self> {
        let authorized_domain = authorized_domain.into();
        if authorized_domain.is_empty() {
            return Err(Error::InvalidConfiguration(
                "authorized domain is empty".into(),
            ));
        }
        if otp_length == 0 || otp_length > MAX_OTP_LENGTH {
            return Err(Error::InvalidConfiguration(format!(
                "otp_length must be between 1 and {MAX_OTP_LENGTH}, got {otp_length}"
            )));
        }
        Ok(Self {
            authorized_domain,
            otp_length,
        })
    }
}

/// Issues and checks one-time passwords for a single authorized domain.
pub struct OtpAuthenticator {
    settings: OtpSettings,
    store: CredentialStore,
    generator: Box<dyn SecretGenerator>,
}

impl OtpAuthenticator {
    pub fn new(settings: OtpSettings, store: CredentialStore) -> Self {
        Self {
            settings,
            store,
            generator: Box::new(DigitGenerator),
        }
    }

    /// Replace the OTP source (e.g. a deterministic one in tests).
    pub fn with_generator(mut self, generator: impl SecretGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn settings(&self) -> &OtpSettings {
        &self.settings
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Mint and store an OTP for `email`, returning it for delivery.
    pub async fn issue(&self, email: &str) -> Result<String> {
        let (identity, domain) = split_address(email)?;
        if domain != self.settings.authorized_domain {
            return Err(Error::UnauthorizedDomain(domain.to_string()));
        }

        let otp = self.generator.generate(self.settings.otp_length);
        self.store.set(identity, otp.clone()).await;
        info!(identity, "OTP issued");
        Ok(otp)
    }

    /// Check `otp` against the pending OTP for `email`.
    ///
    /// Returns `Ok(true)` and consumes the entry on a match, `Ok(false)` on
    /// a mismatch (entry kept), `IdentityNotFound` when nothing is pending
    /// and `InvalidConfiguration` when the stored value is not numeric.
    /// Comparison is numeric, so `"0042"` matches `42`.
    pub async fn verify_and_consume(&self, email: &str, otp: u64) -> Result<bool> {
        let identity = identity_of(email)?;

        let stored = self
            .store
            .get(identity)
            .await
            .ok_or_else(|| Error::IdentityNotFound(identity.to_string()))?;

        let stored_value: u64 = stored.parse().map_err(|_| {
            Error::InvalidConfiguration(format!("stored OTP for {identity} is not numeric"))
        })?;

        if stored_value != otp {
            debug!(identity, "OTP mismatch");
            return Ok(false);
        }

        if self.store.remove_if_eq(identity, &stored).await {
            info!(identity, "OTP verified and consumed");
            return Ok(true);
        }

        // Lost a race: consumed by a concurrent verification, or replaced
        // by a fresh issue between the read and the removal.
        match self.store.get(identity).await {
            Some(_) => Ok(false),
            None => Err(Error::IdentityNotFound(identity.to_string())),
        }
    }
}
