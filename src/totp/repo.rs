//! Storage for two-factor enrollments.
//!
//! Writers always produce the encrypted shape and null the legacy
//! plaintext columns. Backup-code consumption goes through a
//! compare-and-swap on the previous envelope so a racing consumer cannot
//! double-spend a code.

use sqlx::PgPool;
use uuid::Uuid;

use crate::totp::models::TwoFactorEnrollment;

pub struct TwoFactorRepo;

impl TwoFactorRepo {
    /// Fetch the enrollment for a user, if one was ever created.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn fetch(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorEnrollment>, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorEnrollment>(
            r"
            SELECT user_id, enabled,
                   secret_ciphertext, secret_nonce,
                   backup_codes_ciphertext, backup_codes_nonce,
                   secret_plain, backup_codes_plain,
                   created_at, updated_at
            FROM user_twofactor
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Upsert an enabled enrollment with fresh encrypted material. Legacy
    /// plaintext columns are nulled in the same statement.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn upsert_enabled(
        pool: &PgPool,
        user_id: Uuid,
        secret_ciphertext: &str,
        secret_nonce: &str,
        backup_codes_ciphertext: &str,
        backup_codes_nonce: &str,
    ) -> Result<TwoFactorEnrollment, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorEnrollment>(
            r"
            INSERT INTO user_twofactor
                (user_id, enabled,
                 secret_ciphertext, secret_nonce,
                 backup_codes_ciphertext, backup_codes_nonce)
            VALUES ($1, TRUE, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET enabled = TRUE,
                secret_ciphertext = $2,
                secret_nonce = $3,
                backup_codes_ciphertext = $4,
                backup_codes_nonce = $5,
                secret_plain = NULL,
                backup_codes_plain = NULL,
                updated_at = NOW()
            RETURNING user_id, enabled,
                      secret_ciphertext, secret_nonce,
                      backup_codes_ciphertext, backup_codes_nonce,
                      secret_plain, backup_codes_plain,
                      created_at, updated_at
            ",
        )
        .bind(user_id)
        .bind(secret_ciphertext)
        .bind(secret_nonce)
        .bind(backup_codes_ciphertext)
        .bind(backup_codes_nonce)
        .fetch_one(pool)
        .await
    }

    /// Flip `enabled` off. The secret and backup codes are retained until
    /// the next enable replaces them.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn set_disabled(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE user_twofactor
            SET enabled = FALSE, updated_at = NOW()
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the stored backup codes unconditionally (regeneration).
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn replace_backup_codes(
        pool: &PgPool,
        user_id: Uuid,
        ciphertext: &str,
        nonce: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE user_twofactor
            SET backup_codes_ciphertext = $2,
                backup_codes_nonce = $3,
                backup_codes_plain = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .bind(ciphertext)
        .bind(nonce)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored backup codes only if the previous envelope is
    /// unchanged (compare-and-swap; `expected` is NULL for legacy rows).
    /// Returns false when a concurrent writer got there first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn swap_backup_codes(
        pool: &PgPool,
        user_id: Uuid,
        expected_ciphertext: Option<&str>,
        ciphertext: &str,
        nonce: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r"
            UPDATE user_twofactor
            SET backup_codes_ciphertext = $3,
                backup_codes_nonce = $4,
                backup_codes_plain = NULL,
                updated_at = NOW()
            WHERE user_id = $1
              AND backup_codes_ciphertext IS NOT DISTINCT FROM $2
            RETURNING user_id
            ",
        )
        .bind(user_id)
        .bind(expected_ciphertext)
        .bind(ciphertext)
        .bind(nonce)
        .fetch_optional(pool)
        .await?;

        Ok(row.is_some())
    }
}
