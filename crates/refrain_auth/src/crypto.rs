//! At-rest credential encryption and token hashing.
//!
//! Provider credentials are sealed with AES-256-GCM before they hit the
//! database. The ciphertext is stored as base64(nonce || ciphertext); a fresh
//! random nonce is generated per encryption, so sealing the same plaintext
//! twice yields different ciphertexts.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for credentials at rest.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Create a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> AuthResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AuthError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Encrypt a credential for storage.
    pub fn seal(&self, plaintext: &str) -> AuthResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AuthError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a stored credential.
    pub fn unseal(&self, sealed: &str) -> AuthResult<String> {
        let raw = STANDARD.decode(sealed).map_err(|_| AuthError::Decrypt)?;
        if raw.len() <= NONCE_LEN {
            return Err(AuthError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| AuthError::Decrypt)
    }
}

/// Generate a cryptographically random token, hex-encoded.
///
/// `n_bytes` of entropy yields `2 * n_bytes` hex characters.
pub fn generate_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// SHA-256 hash of a token, hex-encoded. Used for bearer tokens that are
/// only ever compared, never read back.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}
