//! Error taxonomy for the two-factor core.
//!
//! Cryptographic and persistence failures are kept distinct from
//! legitimate verification denials so callers can tell "try again" apart
//! from "something is broken". Nothing here is ever collapsed into a bare
//! boolean `false`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The encryption oracle rejected or failed an encrypt call.
    #[error("encryption request failed: {0}")]
    EncryptionFailure(String),

    /// The encryption oracle rejected or failed a decrypt call. Includes
    /// authentication-tag mismatches, which indicate tampering.
    #[error("decryption request failed: {0}")]
    DecryptionFailure(String),

    /// An enrollment claims `enabled` but carries neither an encrypted nor
    /// a legacy secret. Data-integrity violation; deny the attempt.
    #[error("enrollment has no resolvable secret")]
    NoSecretConfigured,

    /// TOTP secret is not valid base32.
    #[error("secret is not valid base32")]
    InvalidSecret,

    /// The proof code presented during enable did not match the secret.
    #[error("verification code does not match the secret")]
    InvalidVerificationCode,

    /// Empty or malformed candidate code during verification.
    #[error("invalid code")]
    InvalidCode,

    /// Operation requires an enrollment that does not exist.
    #[error("two-factor authentication is not configured")]
    NotEnrolled,

    /// Enable was attempted while an enrollment is already active.
    #[error("two-factor authentication is already enabled")]
    AlreadyEnabled,

    /// The stored backup-code list changed between read and write; the
    /// consumption must be retried against fresh state.
    #[error("backup codes were modified concurrently")]
    BackupCodeConflict,

    /// Reading or writing a trust grant failed. Verification fails closed
    /// on this: a challenge is required, never skipped.
    #[error("device trust storage failed")]
    DeviceTrust(#[source] sqlx::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidVerificationCode | Self::InvalidCode => {
                (StatusCode::BAD_REQUEST, "Invalid verification code")
            }
            Self::InvalidSecret => (StatusCode::BAD_REQUEST, "Invalid secret"),
            Self::NotEnrolled => (
                StatusCode::BAD_REQUEST,
                "Two-factor authentication is not configured",
            ),
            Self::AlreadyEnabled => (
                StatusCode::CONFLICT,
                "Two-factor authentication is already enabled",
            ),
            Self::BackupCodeConflict => (
                StatusCode::CONFLICT,
                "Backup codes changed concurrently, try again",
            ),
            Self::EncryptionFailure(cause) | Self::DecryptionFailure(cause) => {
                tracing::error!(error = %cause, "encryption oracle failure");
                (StatusCode::BAD_GATEWAY, "Encryption service unavailable")
            }
            Self::NoSecretConfigured => {
                tracing::error!("enabled enrollment without resolvable secret");
                (StatusCode::INTERNAL_SERVER_ERROR, "Contact support")
            }
            Self::DeviceTrust(err) => {
                tracing::error!(error = ?err, "device trust storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
            Self::Database(err) => {
                tracing::error!(error = ?err, "database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}
