//! Device trust grants: check, grant, list, revoke.
//!
//! Security boundaries:
//! - A live grant bypasses the 2FA challenge for 30 days. That window is
//!   the product's explicit trade-off and is preserved as-is.
//! - Storage failures surface as `DeviceTrust` errors so callers fail
//!   closed into a full challenge, never open into a skip.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    device_trust::{
        fingerprint,
        models::{DeviceProfile, TrustedDevice},
        repo::TrustedDeviceRepo,
    },
    error::AuthError,
};

const DEFAULT_TRUST_TTL_DAYS: i64 = 30;

#[derive(Clone)]
pub struct DeviceTrustService {
    pool: PgPool,
    ttl_days: i64,
}

impl DeviceTrustService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl_days: DEFAULT_TRUST_TTL_DAYS,
        }
    }

    #[must_use]
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl_days = days;
        self
    }

    /// Compute the stable fingerprint for a client profile.
    #[must_use]
    pub fn fingerprint(&self, profile: &DeviceProfile) -> String {
        fingerprint::fingerprint(profile)
    }

    /// True iff a non-expired grant matches this user and fingerprint.
    /// A hit refreshes `last_used_at` as a side effect.
    ///
    /// # Errors
    /// Returns [`AuthError::DeviceTrust`] if storage fails.
    pub async fn is_trusted(&self, user_id: Uuid, fingerprint: &str) -> Result<bool, AuthError> {
        TrustedDeviceRepo::touch_active(&self.pool, user_id, fingerprint)
            .await
            .map_err(AuthError::DeviceTrust)
    }

    /// Grant trust to the device described by `profile`, expiring after
    /// the configured TTL. Repeat calls add rows; lookups only need one
    /// live match.
    ///
    /// # Errors
    /// Returns [`AuthError::DeviceTrust`] if storage fails.
    pub async fn trust(
        &self,
        user_id: Uuid,
        profile: &DeviceProfile,
    ) -> Result<TrustedDevice, AuthError> {
        let fingerprint = fingerprint::fingerprint(profile);
        let device_name = fingerprint::device_name(profile);
        let expires_at = Utc::now() + Duration::days(self.ttl_days);

        let device = TrustedDeviceRepo::insert(
            &self.pool,
            user_id,
            &fingerprint,
            &device_name,
            expires_at,
        )
        .await
        .map_err(AuthError::DeviceTrust)?;

        info!(user_id = %user_id, device = %device.device_name, "device trusted");
        Ok(device)
    }

    /// All live grants for a user, most recently used first.
    ///
    /// # Errors
    /// Returns [`AuthError::DeviceTrust`] if storage fails.
    pub async fn list_trusted(&self, user_id: Uuid) -> Result<Vec<TrustedDevice>, AuthError> {
        TrustedDeviceRepo::list_active(&self.pool, user_id)
            .await
            .map_err(AuthError::DeviceTrust)
    }

    /// Revoke one grant. Returns whether a row was removed so the caller
    /// can drop any cached "trusted" flag for the current device
    /// immediately instead of on the next fetch.
    ///
    /// # Errors
    /// Returns [`AuthError::DeviceTrust`] if storage fails.
    pub async fn revoke(&self, user_id: Uuid, device_id: Uuid) -> Result<bool, AuthError> {
        let removed = TrustedDeviceRepo::delete(&self.pool, user_id, device_id)
            .await
            .map_err(AuthError::DeviceTrust)?;

        if removed {
            info!(user_id = %user_id, device_id = %device_id, "device trust revoked");
        }
        Ok(removed)
    }
}
