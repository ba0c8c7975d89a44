//! Trusted-device management endpoints.

use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Principal;
use crate::{device_trust::DeviceTrustService, error::AuthError};

#[derive(Debug, Serialize, ToSchema)]
pub struct TrustedDeviceResponse {
    pub id: Uuid,
    pub device_name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// List the caller's live trusted devices, most recently used first.
#[utoipa::path(
    get,
    path = "/v1/auth/devices",
    responses(
        (status = 200, description = "Trusted devices", body = [TrustedDeviceResponse])
    ),
    tag = "devices"
)]
pub async fn list_devices(
    Extension(principal): Extension<Principal>,
    Extension(devices): Extension<DeviceTrustService>,
) -> Result<Json<Vec<TrustedDeviceResponse>>, AuthError> {
    let trusted = devices.list_trusted(principal.user_id).await?;

    Ok(Json(
        trusted
            .into_iter()
            .map(|device| TrustedDeviceResponse {
                id: device.id,
                device_name: device.device_name,
                created_at: device.created_at,
                last_used_at: device.last_used_at,
                expires_at: device.expires_at,
            })
            .collect(),
    ))
}

/// Revoke one trusted device. The caller must treat its own cached
/// "trusted" flag as stale immediately, not on the next fetch.
#[utoipa::path(
    delete,
    path = "/v1/auth/devices/{device_id}",
    params(("device_id" = Uuid, Path, description = "Trust grant to revoke")),
    responses(
        (status = 204, description = "Revoked"),
        (status = 404, description = "No such device")
    ),
    tag = "devices"
)]
pub async fn revoke_device(
    Extension(principal): Extension<Principal>,
    Extension(devices): Extension<DeviceTrustService>,
    Path(device_id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    if devices.revoke(principal.user_id, device_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
