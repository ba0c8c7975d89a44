//! Two-factor enrollment and verification endpoints.

use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Principal;
use crate::{
    device_trust::{DeviceTrustService, models::DeviceProfile},
    error::AuthError,
    totp::TwoFactorService,
    verify::{ChallengeEntry, VerificationOrchestrator, VerifyOutcome},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct SetupResponse {
    /// Base32 secret, shown once for manual entry.
    pub secret: String,
    pub otpauth_uri: String,
    /// Provisioning QR as a PNG data URL.
    pub qr_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnableRequest {
    pub secret: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnableResponse {
    /// Plaintext backup codes, returned exactly once.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegenerateResponse {
    /// Fresh plaintext backup codes; previous codes are now invalid.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub profile: DeviceProfile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub challenge_required: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub code: String,
    #[serde(default)]
    pub remember_device: bool,
    pub profile: DeviceProfile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub verified: bool,
    pub used_backup_code: bool,
}

/// Start enrollment: generate a fresh secret and its provisioning QR.
/// Nothing persists until the user proves the authenticator via enable.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "Provisioning material", body = SetupResponse),
        (status = 409, description = "Already enabled")
    ),
    tag = "2fa"
)]
pub async fn setup(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
) -> Result<Json<SetupResponse>, AuthError> {
    if let Some(enrollment) = twofactor.fetch(principal.user_id).await? {
        if enrollment.enabled {
            return Err(AuthError::AlreadyEnabled);
        }
    }

    let provisioning = twofactor.engine().provision(&principal.email)?;
    let qr = twofactor
        .engine()
        .provisioning_qr(&provisioning.secret_base32, &principal.email)?;

    Ok(Json(SetupResponse {
        secret: provisioning.secret_base32,
        otpauth_uri: provisioning.otpauth_uri,
        qr_code: format!("data:image/png;base64,{qr}"),
    }))
}

/// Enable 2FA after the user proves the authenticator works. Returns the
/// backup codes exactly once.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enable",
    request_body = EnableRequest,
    responses(
        (status = 200, description = "Enabled", body = EnableResponse),
        (status = 400, description = "Invalid verification code")
    ),
    tag = "2fa"
)]
pub async fn enable(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
    Json(request): Json<EnableRequest>,
) -> Result<Json<EnableResponse>, AuthError> {
    let enabled = twofactor
        .enable(principal.user_id, request.secret.trim(), request.code.trim())
        .await?;

    Ok(Json(EnableResponse {
        backup_codes: enabled.backup_codes,
    }))
}

/// Disable 2FA. The enrollment record is retained.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    responses(
        (status = 204, description = "Disabled"),
        (status = 400, description = "Not configured")
    ),
    tag = "2fa"
)]
pub async fn disable(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
) -> Result<impl IntoResponse, AuthError> {
    twofactor.disable(principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace all backup codes with a fresh batch, returned exactly once.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/backup-codes/regenerate",
    responses(
        (status = 200, description = "Fresh codes", body = RegenerateResponse),
        (status = 400, description = "Not configured")
    ),
    tag = "2fa"
)]
pub async fn regenerate_backup_codes(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
) -> Result<Json<RegenerateResponse>, AuthError> {
    let backup_codes = twofactor.regenerate_backup_codes(principal.user_id).await?;
    Ok(Json(RegenerateResponse { backup_codes }))
}

/// Decide whether sign-in needs a 2FA challenge on this device.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge decision", body = ChallengeResponse)
    ),
    tag = "2fa"
)]
pub async fn challenge(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
    Extension(devices): Extension<DeviceTrustService>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, AuthError> {
    let mut attempt = VerificationOrchestrator::new(principal.user_id, twofactor, devices);
    let entry = attempt.begin(&request.profile).await?;

    Ok(Json(ChallengeResponse {
        challenge_required: entry == ChallengeEntry::ChallengeRequired,
    }))
}

/// Answer a challenge with an authenticator or backup code, optionally
/// remembering the device on success.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification outcome", body = VerifyResponse),
        (status = 400, description = "Invalid code")
    ),
    tag = "2fa"
)]
pub async fn verify(
    Extension(principal): Extension<Principal>,
    Extension(twofactor): Extension<TwoFactorService>,
    Extension(devices): Extension<DeviceTrustService>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AuthError> {
    let mut attempt = VerificationOrchestrator::new(principal.user_id, twofactor, devices);

    let entry = attempt.begin(&request.profile).await?;
    if entry != ChallengeEntry::ChallengeRequired {
        // Trusted device or 2FA not enabled; nothing to verify.
        return Ok(Json(VerifyResponse {
            verified: true,
            used_backup_code: false,
        }));
    }

    let outcome = attempt.submit(&request.code).await?;
    let response = match outcome {
        VerifyOutcome::Verified { used_backup_code } => {
            if request.remember_device {
                attempt.remember_device(&request.profile).await?;
            }
            VerifyResponse {
                verified: true,
                used_backup_code,
            }
        }
        VerifyOutcome::Denied { .. } => VerifyResponse {
            verified: false,
            used_backup_code: false,
        },
    };

    Ok(Json(response))
}
