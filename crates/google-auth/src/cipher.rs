//! AES-GCM sealing for values kept at rest
//!
//! Output layout is `hex(nonce ‖ ciphertext ‖ tag)` with a 12-byte random
//! nonce and a 16-byte tag. The key length picks the variant: 16 bytes for
//! AES-128, 32 bytes for AES-256.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::RngExt;

use crate::error::{Error, Result};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

enum Sealer {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Sealer {
    fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| Self::Aes128(Box::new(c)))
                .map_err(|e| Error::Cipher(format!("AES-128 key: {e}"))),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| Self::Aes256(Box::new(c)))
                .map_err(|e| Error::Cipher(format!("AES-256 key: {e}"))),
            n => Err(Error::Cipher(format!(
                "key must be 16 or 32 bytes, got {n}"
            ))),
        }
    }

    fn seal(&self, nonce: &Nonce<U12>, plaintext: &[u8]) -> Result<Vec<u8>> {
        let sealed = match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        };
        sealed.map_err(|_| Error::Cipher("encryption failed".into()))
    }

    fn open(&self, nonce: &Nonce<U12>, sealed: &[u8]) -> Result<Vec<u8>> {
        let opened = match self {
            Self::Aes128(c) => c.decrypt(nonce, sealed),
            Self::Aes256(c) => c.decrypt(nonce, sealed),
        };
        opened.map_err(|_| Error::Cipher("decryption failed: wrong key or tampered data".into()))
    }
}

pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<String> {
    let sealer = Sealer::new(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = sealer.seal(nonce, plaintext)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(hex::encode(out))
}

pub fn decrypt(hex_text: &str, key: &[u8]) -> Result<Vec<u8>> {
    let sealer = Sealer::new(key)?;

    let data = hex::decode(hex_text.trim())
        .map_err(|e| Error::Cipher(format!("ciphertext is not valid hex: {e}")))?;
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::Cipher(format!(
            "ciphertext too short: {} bytes",
            data.len()
        )));
    }

    let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
    sealer.open(Nonce::from_slice(nonce_bytes), sealed)
}
