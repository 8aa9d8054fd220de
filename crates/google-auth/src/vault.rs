//! Encrypted-at-rest secret file
//!
//! A JSON map of `name → hex(nonce ‖ ciphertext ‖ tag)`. Values are sealed
//! with `cipher::encrypt` before they reach the map, so the file never holds
//! plaintext. All writes use atomic temp-file + rename; a tokio Mutex
//! serializes writers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cipher;
use crate::error::{Error, Result};

pub struct TokenVault {
    path: PathBuf,
    key: Secret<Vec<u8>>,
    state: Mutex<HashMap<String, String>>,
}

impl TokenVault {
    /// Decode a hex-encoded vault key (16 or 32 bytes).
    pub fn key_from_hex(hex_key: &str) -> Result<Secret<Vec<u8>>> {
        let key = hex::decode(hex_key.trim())
            .map_err(|e| Error::Cipher(format!("vault key is not valid hex: {e}")))?;
        if key.len() != 16 && key.len() != 32 {
            return Err(Error::Cipher(format!(
                "vault key must be 16 or 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(Secret::new(key))
    }

    /// Open the vault file, creating an empty one on cold start.
    pub async fn open(path: PathBuf, key: Secret<Vec<u8>>) -> Result<Self> {
        let state = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading vault file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing vault file: {e}")))?;
            info!(path = %path.display(), entries = entries.len(), "opened token vault");
            entries
        } else {
            info!(path = %path.display(), "vault file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            key,
            state: Mutex::new(state),
        })
    }

    /// Seal `plaintext` and persist it under `name`, replacing any previous value.
    pub async fn save(&self, name: &str, plaintext: &[u8]) -> Result<()> {
        let sealed = cipher::encrypt(plaintext, self.key.expose())?;
        let mut state = self.state.lock().await;
        state.insert(name.to_string(), sealed);
        debug!(name, "sealed vault entry");
        write_atomic(&self.path, &state).await
    }

    /// Decrypted value for `name`, or `None` if absent.
    pub async fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let sealed = {
            let state = self.state.lock().await;
            state.get(name).cloned()
        };
        sealed
            .map(|s| cipher::decrypt(&s, self.key.expose()))
            .transpose()
    }

    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.remove(name).is_none() {
            return Ok(false);
        }
        debug!(name, "removed vault entry");
        write_atomic(&self.path, &state).await?;
        Ok(true)
    }

    pub async fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)
            .map_err(|e| Error::Parse(format!("serializing {name}: {e}")))?;
        self.save(name, &json).await
    }

    pub async fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.load(name).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Parse(format!("parsing {name}: {e}"))),
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Temp file in the same directory, mode 0600, then rename over the target.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing vault: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".vault.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp vault file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting vault file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp vault file: {e}")))?;

    debug!(path = %path.display(), "persisted vault");
    Ok(())
}
