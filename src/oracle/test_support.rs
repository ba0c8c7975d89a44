//! In-process stand-in for the remote encryption oracle, test-only.
//!
//! Same authenticated-encryption semantics as the real service (AEAD,
//! fresh 12-byte nonce per call, tampering detected on decrypt) under a
//! fixed in-memory key. Never compiled into production builds.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};

use crate::{
    error::AuthError,
    oracle::{EncryptionEnvelope, EncryptionOracle},
};

pub(crate) struct MemoryOracle {
    key: [u8; 32],
}

impl MemoryOracle {
    pub(crate) fn new() -> Self {
        Self { key: [7u8; 32] }
    }
}

#[async_trait]
impl EncryptionOracle for MemoryOracle {
    async fn encrypt(&self, plaintext: &str) -> Result<EncryptionEnvelope, AuthError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| AuthError::EncryptionFailure(err.to_string()))?;

        Ok(EncryptionEnvelope {
            ciphertext: Base64::encode_string(&ciphertext),
            nonce: Base64::encode_string(&nonce_bytes),
        })
    }

    async fn decrypt(&self, ciphertext: &str, nonce: &str) -> Result<String, AuthError> {
        let ciphertext = Base64::decode_vec(ciphertext)
            .map_err(|err| AuthError::DecryptionFailure(err.to_string()))?;
        let nonce_bytes = Base64::decode_vec(nonce)
            .map_err(|err| AuthError::DecryptionFailure(err.to_string()))?;
        if nonce_bytes.len() != 12 {
            return Err(AuthError::DecryptionFailure(
                "invalid nonce length".to_string(),
            ));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|err| AuthError::DecryptionFailure(err.to_string()))?;

        String::from_utf8(plaintext).map_err(|err| AuthError::DecryptionFailure(err.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::MemoryOracle;
    use crate::{error::AuthError, oracle::EncryptionOracle};

    #[tokio::test]
    async fn encrypt_decrypt_round_trip() {
        let oracle = MemoryOracle::new();
        let envelope = oracle.encrypt("JBSWY3DPEHPK3PXP").await.unwrap();
        assert_ne!(envelope.ciphertext, "JBSWY3DPEHPK3PXP");

        let plaintext = oracle
            .decrypt(&envelope.ciphertext, &envelope.nonce)
            .await
            .unwrap();
        assert_eq!(plaintext, "JBSWY3DPEHPK3PXP");
    }

    #[tokio::test]
    async fn identical_plaintext_gets_fresh_nonces() {
        let oracle = MemoryOracle::new();
        let first = oracle.encrypt("same input").await.unwrap();
        let second = oracle.encrypt("same input").await.unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_decrypt() {
        let oracle = MemoryOracle::new();
        let envelope = oracle.encrypt("secret").await.unwrap();

        // Flip the last character of the base64 payload.
        let mut tampered = envelope.ciphertext.clone();
        let last = if tampered.ends_with('A') { "B" } else { "A" };
        tampered.replace_range(tampered.len() - 1.., last);

        let result = oracle.decrypt(&tampered, &envelope.nonce).await;
        assert!(matches!(result, Err(AuthError::DecryptionFailure(_))));
    }
}
