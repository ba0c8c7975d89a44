//! HTTP implementation of the encryption oracle client.
//!
//! Wire contract: `POST /encrypt {plaintext} -> {encrypted, iv}` and
//! `POST /decrypt {encryptedData, iv} -> {plaintext}`. Ciphertext and
//! nonce travel as opaque strings; the service reports failures as an
//! `{error}` payload.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{error, instrument};

use crate::{
    APP_USER_AGENT,
    config::OracleConfig,
    error::AuthError,
    oracle::{EncryptionEnvelope, EncryptionOracle, endpoint_url},
};

/// Stateless client to the remote encryption service. Holds no key
/// material and caches no plaintext.
#[derive(Clone)]
pub struct TransitOracle {
    client: Client,
    url: String,
    token: SecretString,
}

impl TransitOracle {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &OracleConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|err| AuthError::EncryptionFailure(err.to_string()))?;

        Ok(Self {
            client,
            url: config.url().to_string(),
            token: config.token().clone(),
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, String> {
        let url = endpoint_url(&self.url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or_default();
            let message = oracle_error_message(&body);
            return Err(format!("{status}, {message}"));
        }

        response.json().await.map_err(|err| err.to_string())
    }
}

#[async_trait]
impl EncryptionOracle for TransitOracle {
    #[instrument(skip(self, plaintext))]
    async fn encrypt(&self, plaintext: &str) -> Result<EncryptionEnvelope, AuthError> {
        let payload = json!({ "plaintext": plaintext });

        let body = self.post("/encrypt", &payload).await.map_err(|cause| {
            error!("Failed to encrypt: {cause}");
            AuthError::EncryptionFailure(cause)
        })?;

        let ciphertext = get_required_str(&body, "encrypted").ok_or_else(|| {
            error!("Failed to encrypt, no ciphertext in response");
            AuthError::EncryptionFailure("missing ciphertext in response".to_string())
        })?;
        let nonce = get_required_str(&body, "iv").ok_or_else(|| {
            error!("Failed to encrypt, no nonce in response");
            AuthError::EncryptionFailure("missing nonce in response".to_string())
        })?;

        Ok(EncryptionEnvelope {
            ciphertext: ciphertext.to_string(),
            nonce: nonce.to_string(),
        })
    }

    #[instrument(skip(self, ciphertext, nonce))]
    async fn decrypt(&self, ciphertext: &str, nonce: &str) -> Result<String, AuthError> {
        let payload = json!({ "encryptedData": ciphertext, "iv": nonce });

        let body = self.post("/decrypt", &payload).await.map_err(|cause| {
            error!("Failed to decrypt: {cause}");
            AuthError::DecryptionFailure(cause)
        })?;

        get_required_str(&body, "plaintext").map_or_else(
            || {
                error!("Failed to decrypt, no plaintext in response");
                Err(AuthError::DecryptionFailure(
                    "missing plaintext in response".to_string(),
                ))
            },
            |plaintext| Ok(plaintext.to_string()),
        )
    }
}

fn oracle_error_message(body: &Value) -> &str {
    body.get("error").and_then(Value::as_str).unwrap_or_default()
}

fn get_required_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}
