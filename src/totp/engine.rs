//! TOTP generation and validation (RFC 6238, SHA1/6 digits/30s).
//!
//! Validation takes an explicit timestamp so callers and tests control the
//! clock; the window covers two steps on each side of the current one
//! (±60 s of skew). Candidate comparison accumulates over every step in
//! the window with no early exit, so the comparison does not leak which
//! step matched.

use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

pub const DIGITS: usize = 6;
pub const PERIOD_SECONDS: u64 = 30;
/// Steps accepted on each side of the current one.
pub const DEFAULT_WINDOW_STEPS: u64 = 2;

const SECRET_BYTES: usize = 20;

/// Output of a provisioning call: the base32 secret shown to the user and
/// the `otpauth://` URI their authenticator scans.
#[derive(Clone, Debug)]
pub struct Provisioning {
    pub secret_base32: String,
    pub otpauth_uri: String,
}

#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Generate a fresh 160-bit secret and its provisioning URI.
    ///
    /// # Errors
    /// Returns an error if the issuer or account label cannot form a valid
    /// `otpauth://` URI.
    pub fn provision(&self, account: &str) -> Result<Provisioning, AuthError> {
        let mut rng = OsRng;
        self.provision_with_rng(&mut rng, account)
    }

    /// Same as [`provision`](Self::provision) with an injected RNG.
    ///
    /// # Errors
    /// Returns an error if the issuer or account label cannot form a valid
    /// `otpauth://` URI.
    pub fn provision_with_rng<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        account: &str,
    ) -> Result<Provisioning, AuthError> {
        let mut secret_bytes = [0u8; SECRET_BYTES];
        rng.fill_bytes(&mut secret_bytes);

        let totp = self.build_totp(secret_bytes.to_vec(), account)?;

        Ok(Provisioning {
            secret_base32: totp.get_secret_base32(),
            otpauth_uri: totp.get_url(),
        })
    }

    /// Render the provisioning QR image as a base64 PNG. Pure
    /// presentation; the protocol never depends on it.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidSecret`] for non-base32 secrets, or an
    /// internal error if image rendering fails.
    pub fn provisioning_qr(&self, secret_base32: &str, account: &str) -> Result<String, AuthError> {
        let secret_bytes = decode_secret(secret_base32)?;
        let totp = self.build_totp(secret_bytes, account)?;

        totp.get_qr_base64()
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("QR render error: {err}")))
    }

    /// Validate a candidate code against the current system time.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidSecret`] for non-base32 secrets.
    pub fn validate(&self, secret_base32: &str, candidate: &str) -> Result<bool, AuthError> {
        let now_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("system time error: {err}")))?
            .as_secs();
        self.validate_at(secret_base32, candidate, now_unix, DEFAULT_WINDOW_STEPS)
    }

    /// Validate a candidate code at an explicit Unix timestamp, accepting
    /// `window_steps` steps of skew on each side.
    ///
    /// Malformed candidates (wrong length, non-digits) never validate.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidSecret`] for non-base32 secrets.
    pub fn validate_at(
        &self,
        secret_base32: &str,
        candidate: &str,
        now_unix: u64,
        window_steps: u64,
    ) -> Result<bool, AuthError> {
        if !well_formed_candidate(candidate) {
            return Ok(false);
        }

        let secret_bytes = decode_secret(secret_base32)?;
        // new_unchecked: legacy secrets may be shorter than the RFC 4226
        // recommended minimum and must still resolve.
        let totp = TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            1,
            PERIOD_SECONDS,
            secret_bytes,
            None,
            String::new(),
        );

        let current_step = i64::try_from(now_unix / PERIOD_SECONDS).unwrap_or(i64::MAX);
        let window = i64::try_from(window_steps).unwrap_or(0);

        let mut matched = false;
        for offset in -window..=window {
            let step = current_step + offset;
            if step < 0 {
                continue;
            }
            let expected = totp.generate(step.unsigned_abs() * PERIOD_SECONDS);
            matched |= bool::from(expected.as_bytes().ct_eq(candidate.as_bytes()));
        }

        Ok(matched)
    }

    fn build_totp(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP, AuthError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            1,
            PERIOD_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("TOTP init error: {err}")))
    }
}

/// Accept exactly six ASCII digits; anything else can never validate.
fn well_formed_candidate(candidate: &str) -> bool {
    candidate.len() == DIGITS && candidate.bytes().all(|byte| byte.is_ascii_digit())
}

fn decode_secret(secret_base32: &str) -> Result<Vec<u8>, AuthError> {
    let normalized = secret_base32.trim().to_ascii_uppercase();
    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|_| AuthError::InvalidSecret)?;
    if bytes.is_empty() {
        return Err(AuthError::InvalidSecret);
    }
    Ok(bytes)
}
