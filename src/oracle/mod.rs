//! Client interface to the remote encryption oracle.
//!
//! The oracle holds the single server-side symmetric key (AES-GCM, fresh
//! 96-bit nonce per call) and exposes plain encrypt/decrypt over HTTP.
//! This process only ever sees opaque ciphertext/nonce pairs. Failures are
//! surfaced as typed errors; a failed decrypt is never treated as "no
//! secret".

pub mod transit;

#[cfg(test)]
pub(crate) mod test_support;

use async_trait::async_trait;

use crate::error::AuthError;

pub use transit::TransitOracle;

/// One encrypt call's output. A fresh nonce is generated per call; nonces
/// are never reused across envelopes even for identical plaintext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionEnvelope {
    pub ciphertext: String,
    pub nonce: String,
}

/// Injected seam for the remote encryption service. Production uses
/// [`TransitOracle`]; tests use an in-process AEAD implementation.
#[async_trait]
pub trait EncryptionOracle: Send + Sync {
    /// Encrypt an opaque string, returning a ciphertext/nonce envelope.
    ///
    /// # Errors
    /// Returns [`AuthError::EncryptionFailure`] if the call fails.
    async fn encrypt(&self, plaintext: &str) -> Result<EncryptionEnvelope, AuthError>;

    /// Decrypt an envelope back to the plaintext string.
    ///
    /// # Errors
    /// Returns [`AuthError::DecryptionFailure`] if the call fails or the
    /// ciphertext does not authenticate.
    async fn decrypt(&self, ciphertext: &str, nonce: &str) -> Result<String, AuthError>;
}

/// Join the oracle base URL and an endpoint path.
pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}{path}")
}

#[cfg(test)]
mod tests {
    use super::endpoint_url;

    #[test]
    fn endpoint_url_trims_trailing_slash() {
        assert_eq!(
            endpoint_url("https://oracle.soldi.app/", "/encrypt"),
            "https://oracle.soldi.app/encrypt"
        );
        assert_eq!(
            endpoint_url("https://oracle.soldi.app", "/decrypt"),
            "https://oracle.soldi.app/decrypt"
        );
    }
}
