//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (JWT signing secret, vault key, OAuth client JSON) come from the
//! environment or from a referenced file, never from the TOML itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use authenticator::OtpSettings;
use common::Secret;
use google_auth::InteractionMode;
use gsuite::{STATION_SHEET, VEHICLE_SHEET};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// OTP login and session settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub authorized_domain: String,
    pub otp_length: usize,
    pub otp_ttl_secs: u64,
    pub session_lifetime_months: u32,
    /// Path to a file holding the JWT signing secret (alternative to JWT_SECRET)
    pub jwt_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub jwt_secret: Option<Secret<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorized_domain: String::new(),
            otp_length: 6,
            otp_ttl_secs: 180,
            session_lifetime_months: 1,
            jwt_secret_file: None,
            jwt_secret: None,
        }
    }
}

impl AuthConfig {
    /// OTP policy for the authenticator.
    pub fn otp_settings(&self) -> authenticator::Result<OtpSettings> {
        OtpSettings::new(self.authorized_domain.clone(), self.otp_length)
    }
}

/// Delegated Google access (mail delivery, spreadsheets)
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub enabled: bool,
    /// OAuth client JSON as downloaded from the Google console
    pub credentials_file: Option<PathBuf>,
    #[serde(skip)]
    pub credentials_json: Option<Secret<String>>,
    /// Overrides the first redirect URI of the client JSON
    pub redirect_uri: Option<String>,
    pub interaction_mode: InteractionMode,
    /// Redirect-mode wait for the consent callback; 0 waits forever
    pub handshake_timeout_secs: u64,
    pub vault_path: PathBuf,
    /// Path to a file holding the hex vault key (alternative to AES_SECRET)
    pub vault_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub vault_key: Option<Secret<String>>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            credentials_file: None,
            credentials_json: None,
            redirect_uri: None,
            interaction_mode: InteractionMode::Manual,
            handshake_timeout_secs: 0,
            vault_path: PathBuf::from("aat-vault.json"),
            vault_key_file: None,
            vault_key: None,
        }
    }
}

/// Spreadsheet IDs behind the logical sheet names
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub vehicle_sheet_id: Option<String>,
    pub station_sheet_id: Option<String>,
}

impl SheetsConfig {
    /// Logical name → spreadsheet ID, for the configured sheets only.
    pub fn spreadsheets(&self) -> HashMap<String, String> {
        [
            (VEHICLE_SHEET, &self.vehicle_sheet_id),
            (STATION_SHEET, &self.station_sheet_id),
        ]
        .into_iter()
        .filter_map(|(name, id)| id.clone().map(|id| (name.to_string(), id)))
        .collect()
    }
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// resolve secrets and validate the result.
    ///
    /// Secret resolution order (each): env var, then the `*_file` path.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.apply_env()?;
        config.resolve_secrets()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(domain) = std::env::var("AUTHORIZED_DOMAIN") {
            self.auth.authorized_domain = domain.trim().to_owned();
        }
        env_parse("OTP_LENGTH", &mut self.auth.otp_length)?;
        env_parse("JWT_EXPIRE_IN_MONTH", &mut self.auth.session_lifetime_months)?;
        env_parse("WITH_GOOGLE_SERVICE", &mut self.google.enabled)?;

        let mut web_auth = self.google.interaction_mode == InteractionMode::Redirect;
        env_parse("WEB_AUTH", &mut web_auth)?;
        self.google.interaction_mode = if web_auth {
            InteractionMode::Redirect
        } else {
            InteractionMode::Manual
        };

        if let Ok(id) = std::env::var("VEHICLE_SHEET_ID") {
            self.sheets.vehicle_sheet_id = Some(id);
        }
        if let Ok(id) = std::env::var("STATION_SHEET_ID") {
            self.sheets.station_sheet_id = Some(id);
        }
        Ok(())
    }

    fn resolve_secrets(&mut self) -> common::Result<()> {
        self.auth.jwt_secret = secret_from("JWT_SECRET", self.auth.jwt_secret_file.as_deref())?;
        self.google.vault_key = secret_from("AES_SECRET", self.google.vault_key_file.as_deref())?;

        // Client JSON is used verbatim, no trimming.
        self.google.credentials_json = match std::env::var("GOOGLE_CREDENTIAL") {
            Ok(json) if !json.trim().is_empty() => Some(Secret::new(json)),
            _ => match &self.google.credentials_file {
                Some(file) => Some(Secret::new(read_file(file, "credentials_file")?)),
                None => None,
            },
        };
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.auth.authorized_domain.is_empty() {
            return Err(common::Error::MissingSetting("AUTHORIZED_DOMAIN"));
        }

        self.auth
            .otp_settings()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if self.auth.otp_ttl_secs == 0 {
            return Err(common::Error::Config(
                "otp_ttl_secs must be greater than 0".into(),
            ));
        }

        if self.google.enabled {
            if self.google.credentials_json.is_none() {
                return Err(common::Error::MissingSetting("GOOGLE_CREDENTIAL"));
            }
            if self.google.vault_key.is_none() {
                return Err(common::Error::MissingSetting("AES_SECRET"));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("aat-manager.toml")
    }
}

/// Overwrite `target` with the parsed value of env var `name`, if set.
fn env_parse<T: FromStr>(name: &'static str, target: &mut T) -> common::Result<()> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| common::Error::Config(format!("{name} has an invalid value: {raw:?}")))?;
    }
    Ok(())
}

/// Env var first, then the trimmed file content. Empty values count as unset.
fn secret_from(env: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env) {
        return Ok(Some(Secret::new(value.trim().to_owned())));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = read_file(file, env)?.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}

fn read_file(file: &Path, what: &str) -> common::Result<String> {
    std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {what} file {}: {e}", file.display()))
    })
}
