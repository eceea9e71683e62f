//! OAuth token encryption at rest
//!
//! Uses AES-256-GCM. Sealed values are stored in a single column as
//! `enc:v1:<nonce_b64>:<ciphertext_b64>`; values without that prefix are
//! treated as plaintext, so enabling a key later keeps existing rows readable.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

/// AES-256-GCM nonce size (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;
/// AES-256 key size (256 bits = 32 bytes)
const KEY_SIZE: usize = 32;

const SEALED_PREFIX: &str = "enc:v1:";

/// Seals and opens provider tokens; a passthrough when no key is configured
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Option<Aes256Gcm>,
}

impl TokenCipher {
    /// Cipher from a base64 key that must decode to exactly 32 bytes
    pub fn from_base64_key(key_b64: &str) -> Result<Self> {
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(|e| anyhow!("Invalid base64 key: {}", e))?;

        if key.len() != KEY_SIZE {
            return Err(anyhow!(
                "Invalid key length: expected {} bytes, got {}",
                KEY_SIZE,
                key.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self {
            cipher: Some(cipher),
        })
    }

    /// Store tokens as given
    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    /// Cipher for an optional configured key
    pub fn from_config(key: Option<&str>) -> Result<Self> {
        match key {
            Some(key) => Self::from_base64_key(key),
            None => Ok(Self::plaintext()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Generate a random encryption key (for initial setup)
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let Some(ref cipher) = self.cipher else {
            return Ok(plaintext.to_string());
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok(format!(
            "{}{}:{}",
            SEALED_PREFIX,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    pub fn open(&self, stored: &str) -> Result<String> {
        let Some(sealed) = stored.strip_prefix(SEALED_PREFIX) else {
            return Ok(stored.to_string());
        };

        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| anyhow!("Token is encrypted but no encryption key is configured"))?;

        let (nonce_b64, data_b64) = sealed
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid sealed token format"))?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| anyhow!("Invalid nonce: {}", e))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce length: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            ));
        }
        let ciphertext = BASE64
            .decode(data_b64)
            .map_err(|e| anyhow!("Invalid encrypted data: {}", e))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8 in decrypted data: {}", e))
    }
}

// Implement Debug without exposing the cipher
impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let cipher = TokenCipher::from_base64_key(&TokenCipher::generate_key()).unwrap();

        let sealed = cipher.seal("access-token").unwrap();
        assert!(sealed.starts_with(SEALED_PREFIX));
        assert!(!sealed.contains("access-token"));
        assert_eq!(cipher.open(&sealed).unwrap(), "access-token");
    }

    #[test]
    fn test_same_plaintext_seals_differently() {
        let cipher = TokenCipher::from_base64_key(&TokenCipher::generate_key()).unwrap();
        assert_ne!(cipher.seal("same").unwrap(), cipher.seal("same").unwrap());
    }

    #[test]
    fn test_plaintext_passthrough() {
        let cipher = TokenCipher::plaintext();
        assert_eq!(cipher.seal("token").unwrap(), "token");
        assert_eq!(cipher.open("token").unwrap(), "token");

        // Rows written before a key was configured stay readable
        let keyed = TokenCipher::from_base64_key(&TokenCipher::generate_key()).unwrap();
        assert_eq!(keyed.open("legacy-token").unwrap(), "legacy-token");
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = TokenCipher::from_base64_key(&TokenCipher::generate_key()).unwrap();
        let b = TokenCipher::from_base64_key(&TokenCipher::generate_key()).unwrap();

        let sealed = a.seal("secret").unwrap();
        assert!(b.open(&sealed).is_err());
        assert!(TokenCipher::plaintext().open(&sealed).is_err());
    }

    #[test]
    fn test_key_must_be_32_bytes() {
        // "key" (3 bytes)
        let err = TokenCipher::from_base64_key("a2V5").unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 3"));

        let long = BASE64.encode([7u8; 48]);
        assert!(TokenCipher::from_base64_key(&long).is_err());
        assert!(TokenCipher::from_config(Some("a2V5")).is_err());

        assert!(TokenCipher::from_base64_key(&BASE64.encode([7u8; KEY_SIZE])).is_ok());
    }
}
