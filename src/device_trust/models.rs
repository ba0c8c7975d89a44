//! Trusted-device rows and the client profile they are derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use utoipa::ToSchema;
use uuid::Uuid;

/// A time-limited trust grant for one (user, device-fingerprint) pair.
#[derive(Clone, Debug)]
pub struct TrustedDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_fingerprint: String,
    pub device_name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrustedDevice {
    /// A grant only counts while `expires_at` is in the future; expired
    /// rows may linger in storage and must never read as trusted.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl<'r> FromRow<'r, PgRow> for TrustedDevice {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            device_fingerprint: row.try_get("device_fingerprint")?,
            device_name: row.try_get("device_name")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

/// Client-reported environment characteristics the fingerprint is derived
/// from. Collected by the browser and posted with challenge requests.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceProfile {
    pub user_agent: String,
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone_offset_minutes: i32,
    pub canvas_signature: String,
}
