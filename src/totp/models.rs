//! Persistent enrollment record and dual-schema secret resolution.
//!
//! Pre-migration rows carry plaintext columns; current rows carry oracle
//! envelopes. The capability check lives here, once, so callers never
//! branch on column presence themselves.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, postgres::PgRow};
use uuid::Uuid;

/// One 2FA enrollment per user. At most one row, keyed by `user_id`.
#[derive(Clone, Debug)]
pub struct TwoFactorEnrollment {
    pub user_id: Uuid,
    pub enabled: bool,
    pub secret_ciphertext: Option<String>,
    pub secret_nonce: Option<String>,
    pub backup_codes_ciphertext: Option<String>,
    pub backup_codes_nonce: Option<String>,
    /// Legacy plaintext secret (base32). Read-only; writers null it.
    pub secret_plain: Option<String>,
    /// Legacy plaintext backup codes (JSON array). Read-only; writers null it.
    pub backup_codes_plain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which storage shape a secret-bearing field resolves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretMaterial<'a> {
    Encrypted { ciphertext: &'a str, nonce: &'a str },
    Legacy(&'a str),
    Missing,
}

impl TwoFactorEnrollment {
    /// Resolution source for the TOTP secret. Encrypted fields win over
    /// legacy plaintext when both are somehow present.
    #[must_use]
    pub fn secret_material(&self) -> SecretMaterial<'_> {
        match (
            self.secret_ciphertext.as_deref(),
            self.secret_nonce.as_deref(),
            self.secret_plain.as_deref(),
        ) {
            (Some(ciphertext), Some(nonce), _) => SecretMaterial::Encrypted { ciphertext, nonce },
            (_, _, Some(plain)) if !plain.is_empty() => SecretMaterial::Legacy(plain),
            _ => SecretMaterial::Missing,
        }
    }

    /// Resolution source for the backup-code list.
    #[must_use]
    pub fn backup_code_material(&self) -> SecretMaterial<'_> {
        match (
            self.backup_codes_ciphertext.as_deref(),
            self.backup_codes_nonce.as_deref(),
            self.backup_codes_plain.as_deref(),
        ) {
            (Some(ciphertext), Some(nonce), _) => SecretMaterial::Encrypted { ciphertext, nonce },
            (_, _, Some(plain)) if !plain.is_empty() => SecretMaterial::Legacy(plain),
            _ => SecretMaterial::Missing,
        }
    }

    /// An enabled enrollment must carry a resolvable secret; anything else
    /// is a data-integrity violation.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.enabled || self.secret_material() != SecretMaterial::Missing
    }
}

impl<'r> FromRow<'r, PgRow> for TwoFactorEnrollment {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            enabled: row.try_get("enabled")?,
            secret_ciphertext: row.try_get("secret_ciphertext")?,
            secret_nonce: row.try_get("secret_nonce")?,
            backup_codes_ciphertext: row.try_get("backup_codes_ciphertext")?,
            backup_codes_nonce: row.try_get("backup_codes_nonce")?,
            secret_plain: row.try_get("secret_plain")?,
            backup_codes_plain: row.try_get("backup_codes_plain")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
pub(crate) fn enrollment_fixture(user_id: Uuid) -> TwoFactorEnrollment {
    TwoFactorEnrollment {
        user_id,
        enabled: true,
        secret_ciphertext: None,
        secret_nonce: None,
        backup_codes_ciphertext: None,
        backup_codes_nonce: None,
        secret_plain: None,
        backup_codes_plain: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
