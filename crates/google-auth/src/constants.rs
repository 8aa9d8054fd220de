//! Google OAuth endpoints and scopes
//!
//! Defaults used when the client credentials JSON omits them. The client ID
//! and secret always come from that JSON.

/// Authorization endpoint the user's browser is sent to
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Send-only Gmail access
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Read/write access to spreadsheets
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Fixed state marker used by the manual (paste-the-code) flow
pub const MANUAL_STATE: &str = "state-token";

/// Vault entry name holding the serialized delegated token
pub const VAULT_TOKEN_NAME: &str = "gtoken";
