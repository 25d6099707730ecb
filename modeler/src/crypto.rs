use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand_core::{OsRng, RngCore};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption error: {0}")]
    Encrypt(String),
    #[error("Decryption error: {0}")]
    Decrypt(String),
    #[error("Base64 decode error: {0}")]
    Decode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Secret half of a datasource's connection settings, stored encrypted in
/// `datasources.secure_config`.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SecureConfig {
    /// Encrypt for storage. An empty config is stored as the empty string.
    pub fn seal(&self, key: &[u8; 32]) -> Result<String, CryptoError> {
        if self.password.is_none() {
            return Ok(String::new());
        }
        encrypt_json(&serde_json::to_value(self)?, key)
    }

    pub fn open(stored: &str, key: &[u8; 32]) -> Result<Self, CryptoError> {
        if stored.is_empty() {
            return Ok(Self::default());
        }
        let value = decrypt_json(stored, key)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Encrypt a JSON value with AES-256-GCM.
/// Returns base64(12-byte nonce ‖ ciphertext+tag).
pub fn encrypt_json(data: &serde_json::Value, key: &[u8; 32]) -> Result<String, CryptoError> {
    let plaintext = serde_json::to_vec(data)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(key.into());
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(&combined))
}

/// Decrypt a base64-encoded AES-256-GCM ciphertext back to a JSON value.
pub fn decrypt_json(encoded: &str, key: &[u8; 32]) -> Result<serde_json::Value, CryptoError> {
    let data = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Decode(e.to_string()))?;

    if data.len() < NONCE_LEN {
        return Err(CryptoError::Decrypt("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

    Ok(serde_json::from_slice(&plaintext)?)
}
