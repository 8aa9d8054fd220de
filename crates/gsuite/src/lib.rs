//! Google Workspace capabilities used by the gateway
//!
//! Thin REST clients for Gmail (send one message) and Sheets (append, list,
//! read a range). Both authenticate with the delegated token held by
//! `google_auth::TokenSource`.

pub mod a1;
pub mod error;
pub mod mail;
pub mod sheet;

#[cfg(test)]
mod test_support;

pub use a1::{column_name, is_a1_range};
pub use error::{Error, Result};
pub use mail::{DisabledMailer, GmailSender, MailSender, build_message};
pub use sheet::{Row, STATION_SHEET, SheetsClient, VEHICLE_SHEET};
