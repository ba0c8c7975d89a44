//! Storage for trusted-device grants.
//!
//! Expiry is enforced in every read; rows past `expires_at` are dead
//! weight until a user revokes them or the table is vacuumed out of band.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::device_trust::models::TrustedDevice;

pub struct TrustedDeviceRepo;

impl TrustedDeviceRepo {
    /// Refresh `last_used_at` on a live grant for this fingerprint.
    /// Returns false when no non-expired grant matches.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn touch_active(
        pool: &PgPool,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r"
            UPDATE trusted_devices
            SET last_used_at = NOW()
            WHERE user_id = $1
              AND device_fingerprint = $2
              AND expires_at > NOW()
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

        Ok(row.is_some())
    }

    /// Insert a new grant. Repeat grants for the same fingerprint create
    /// additional rows; reads only need any one live match.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn insert(
        pool: &PgPool,
        user_id: Uuid,
        fingerprint: &str,
        device_name: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<TrustedDevice, sqlx::Error> {
        sqlx::query_as::<_, TrustedDevice>(
            r"
            INSERT INTO trusted_devices
                (id, user_id, device_fingerprint, device_name, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, device_fingerprint, device_name,
                      created_at, last_used_at, expires_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(fingerprint)
        .bind(device_name)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// All live grants for a user, most recently used first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_active(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<TrustedDevice>, sqlx::Error> {
        sqlx::query_as::<_, TrustedDevice>(
            r"
            SELECT id, user_id, device_fingerprint, device_name,
                   created_at, last_used_at, expires_at
            FROM trusted_devices
            WHERE user_id = $1
              AND expires_at > NOW()
            ORDER BY last_used_at DESC
            ",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Delete one grant by id, scoped to the owning user.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn delete(pool: &PgPool, user_id: Uuid, device_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM trusted_devices
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(device_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
