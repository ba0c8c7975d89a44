//! HTTP surface for the two-factor core.
//!
//! The host dashboard service mounts this router and supplies the
//! authenticated [`Principal`](handlers::Principal) as a request
//! extension; session issuance and rate limiting stay on the host side.

pub mod handlers;

use axum::{
    Extension, Router,
    routing::{delete, get, post},
};

use crate::{device_trust::DeviceTrustService, totp::TwoFactorService};

/// Build the router with all two-factor and device-trust routes.
#[must_use]
pub fn router(twofactor: TwoFactorService, devices: DeviceTrustService) -> Router {
    Router::new()
        .route("/v1/auth/2fa/setup", post(handlers::twofactor::setup))
        .route("/v1/auth/2fa/enable", post(handlers::twofactor::enable))
        .route("/v1/auth/2fa/disable", post(handlers::twofactor::disable))
        .route(
            "/v1/auth/2fa/backup-codes/regenerate",
            post(handlers::twofactor::regenerate_backup_codes),
        )
        .route("/v1/auth/2fa/challenge", post(handlers::twofactor::challenge))
        .route("/v1/auth/2fa/verify", post(handlers::twofactor::verify))
        .route("/v1/auth/devices", get(handlers::devices::list_devices))
        .route(
            "/v1/auth/devices/:device_id",
            delete(handlers::devices::revoke_device),
        )
        .layer(Extension(twofactor))
        .layer(Extension(devices))
}
