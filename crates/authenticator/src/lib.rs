//! Passwordless login core
//!
//! Email OTP issuance/verification on top of a self-expiring in-memory
//! credential store, plus stateless HS256 session tokens. The HTTP layer
//! owns mail delivery and cookies; this crate only decides who is who.
//!
//! Login flow:
//! 1. `OtpAuthenticator::issue()` validates the domain and stores a fresh OTP
//! 2. The caller delivers the OTP by mail
//! 3. `OtpAuthenticator::verify_and_consume()` checks and deletes it
//! 4. `SessionIssuer::issue()` mints the session token

pub mod error;
pub mod generator;
pub mod identity;
pub mod otp;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use generator::{DigitGenerator, SecretGenerator};
pub use identity::{identity_of, split_address};
pub use otp::{MAX_OTP_LENGTH, OtpAuthenticator, OtpSettings};
pub use session::{SessionClaims, SessionIssuer};
pub use store::{CredentialEntry, CredentialStore, DEFAULT_TTL};
