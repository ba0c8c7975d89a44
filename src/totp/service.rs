//! Enrollment lifecycle service: enable, disable, regenerate, resolve.
//!
//! Flow Overview:
//! 1) `enable` proves the authenticator works before anything persists.
//! 2) Secret and backup codes are encrypted independently, one envelope
//!    and one nonce each, then upserted with the legacy columns nulled.
//! 3) Plaintext backup codes leave this module exactly once, at
//!    enable/regenerate time; they are never retrievable afterwards.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AuthError,
    oracle::EncryptionOracle,
    totp::{
        backup,
        engine::{DEFAULT_WINDOW_STEPS, TotpEngine},
        models::{SecretMaterial, TwoFactorEnrollment},
        repo::TwoFactorRepo,
    },
};

/// Result of a successful enable: the persisted record and the plaintext
/// backup codes, returned once for the user to save.
#[derive(Clone, Debug)]
pub struct EnabledEnrollment {
    pub enrollment: TwoFactorEnrollment,
    pub backup_codes: Vec<String>,
}

#[derive(Clone)]
pub struct TwoFactorService {
    pool: PgPool,
    oracle: Arc<dyn EncryptionOracle>,
    engine: TotpEngine,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(pool: PgPool, oracle: Arc<dyn EncryptionOracle>, engine: TotpEngine) -> Self {
        Self {
            pool,
            oracle,
            engine,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &TotpEngine {
        &self.engine
    }

    /// Fetch the enrollment record for a user, `None` if never enrolled.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn fetch(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>, AuthError> {
        Ok(TwoFactorRepo::fetch(&self.pool, user_id).await?)
    }

    /// Resolve the TOTP secret through whichever shape the record carries.
    ///
    /// # Errors
    /// Returns [`AuthError::DecryptionFailure`] if the oracle call fails —
    /// never silently treated as "no secret" — and
    /// [`AuthError::NoSecretConfigured`] when neither shape is present.
    pub async fn resolve_secret(
        &self,
        enrollment: &TwoFactorEnrollment,
    ) -> Result<String, AuthError> {
        match enrollment.secret_material() {
            SecretMaterial::Encrypted { ciphertext, nonce } => {
                self.oracle.decrypt(ciphertext, nonce).await
            }
            SecretMaterial::Legacy(plain) => Ok(plain.to_string()),
            SecretMaterial::Missing => Err(AuthError::NoSecretConfigured),
        }
    }

    /// Resolve the backup-code list. A record with neither shape yields an
    /// empty list: exhausted or never-issued codes are not an error.
    ///
    /// # Errors
    /// Returns an error if decryption fails or the stored list is corrupt.
    pub async fn resolve_backup_codes(
        &self,
        enrollment: &TwoFactorEnrollment,
    ) -> Result<Vec<String>, AuthError> {
        match enrollment.backup_code_material() {
            SecretMaterial::Encrypted { ciphertext, nonce } => {
                let raw = self.oracle.decrypt(ciphertext, nonce).await?;
                backup::deserialize(&raw)
            }
            SecretMaterial::Legacy(plain) => backup::deserialize(plain),
            SecretMaterial::Missing => Ok(Vec::new()),
        }
    }

    /// Enable 2FA for a user. The verification code must prove the
    /// authenticator was provisioned with `secret_base32`; without that
    /// proof nothing is persisted.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidVerificationCode`] when the proof code
    /// does not match, [`AuthError::InvalidSecret`] for a malformed
    /// secret, or an encryption/database error.
    pub async fn enable(
        &self,
        user_id: Uuid,
        secret_base32: &str,
        verification_code: &str,
    ) -> Result<EnabledEnrollment, AuthError> {
        if !self.engine.validate(secret_base32, verification_code)? {
            warn!(user_id = %user_id, "2FA enable rejected: proof code mismatch");
            return Err(AuthError::InvalidVerificationCode);
        }

        let backup_codes = backup::generate();

        // Independent envelopes: each encrypt call draws its own nonce.
        let secret_envelope = self.oracle.encrypt(secret_base32).await?;
        let serialized = backup::serialize(&backup_codes)?;
        let codes_envelope = self.oracle.encrypt(&serialized).await?;

        let enrollment = TwoFactorRepo::upsert_enabled(
            &self.pool,
            user_id,
            &secret_envelope.ciphertext,
            &secret_envelope.nonce,
            &codes_envelope.ciphertext,
            &codes_envelope.nonce,
        )
        .await?;

        info!(user_id = %user_id, "2FA enabled");

        Ok(EnabledEnrollment {
            enrollment,
            backup_codes,
        })
    }

    /// Disable 2FA. The record, secret, and backup codes persist so
    /// support can audit the enrollment; a later enable replaces them
    /// wholesale.
    ///
    /// # Errors
    /// Returns [`AuthError::NotEnrolled`] when no record exists, or a
    /// database error.
    pub async fn disable(&self, user_id: Uuid) -> Result<(), AuthError> {
        if !TwoFactorRepo::set_disabled(&self.pool, user_id).await? {
            return Err(AuthError::NotEnrolled);
        }
        info!(user_id = %user_id, "2FA disabled");
        Ok(())
    }

    /// Replace the backup codes with a fresh batch. Old codes become
    /// permanently invalid; the new plaintext is returned once.
    ///
    /// # Errors
    /// Returns [`AuthError::NotEnrolled`] when no record exists, or an
    /// encryption/database error.
    pub async fn regenerate_backup_codes(&self, user_id: Uuid) -> Result<Vec<String>, AuthError> {
        let backup_codes = backup::generate();
        let serialized = backup::serialize(&backup_codes)?;
        let envelope = self.oracle.encrypt(&serialized).await?;

        let replaced = TwoFactorRepo::replace_backup_codes(
            &self.pool,
            user_id,
            &envelope.ciphertext,
            &envelope.nonce,
        )
        .await?;
        if !replaced {
            return Err(AuthError::NotEnrolled);
        }

        info!(user_id = %user_id, "backup codes regenerated");
        Ok(backup_codes)
    }

    /// Try to consume a backup code. On a match the reduced list is
    /// persisted through a compare-and-swap against the envelope the
    /// enrollment was read with; a concurrent consumer surfaces as
    /// [`AuthError::BackupCodeConflict`] rather than a double spend.
    ///
    /// # Errors
    /// Returns an encryption or database error, or `BackupCodeConflict`
    /// if the stored list changed since `enrollment` was read.
    pub async fn consume_backup_code(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
    ) -> Result<bool, AuthError> {
        let codes = self.resolve_backup_codes(enrollment).await?;
        if codes.is_empty() {
            return Ok(false);
        }

        let consumption = backup::consume(&codes, candidate);
        if !consumption.matched {
            return Ok(false);
        }

        let serialized = backup::serialize(&consumption.remaining)?;
        let envelope = self.oracle.encrypt(&serialized).await?;

        let swapped = TwoFactorRepo::swap_backup_codes(
            &self.pool,
            enrollment.user_id,
            enrollment.backup_codes_ciphertext.as_deref(),
            &envelope.ciphertext,
            &envelope.nonce,
        )
        .await?;
        if !swapped {
            warn!(user_id = %enrollment.user_id, "backup code consumption lost a race");
            return Err(AuthError::BackupCodeConflict);
        }

        info!(
            user_id = %enrollment.user_id,
            remaining = consumption.remaining.len(),
            "backup code consumed"
        );
        Ok(true)
    }

    /// Validate a TOTP candidate against the enrollment's secret at an
    /// explicit timestamp.
    ///
    /// # Errors
    /// Propagates secret-resolution and validation errors.
    pub async fn validate_code_at(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
        now_unix: u64,
    ) -> Result<bool, AuthError> {
        let secret = self.resolve_secret(enrollment).await?;
        self.engine
            .validate_at(&secret, candidate, now_unix, DEFAULT_WINDOW_STEPS)
    }
}
