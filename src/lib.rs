//! # soldi-auth (Two-Factor Authentication Core)
//!
//! `soldi-auth` is the authentication core of the Soldi personal-finance
//! dashboard. It owns TOTP enrollment and verification, encrypted
//! secret-at-rest storage, single-use backup codes, and device-trust
//! grants that exempt a recognized browser from repeated challenges.
//!
//! ## Secret handling
//!
//! TOTP secrets and backup codes are never persisted in plaintext. Each
//! value is sent to a remote encryption oracle holding the symmetric key
//! and stored as a `{ciphertext, nonce}` envelope. Pre-migration rows may
//! still carry plaintext columns; readers accept both shapes, writers
//! always produce the encrypted shape and null the legacy columns.
//!
//! ## Device trust
//!
//! After a successful challenge a user may opt to remember the current
//! device. A trust grant is keyed by a deterministic, non-cryptographic
//! fingerprint of the client environment, scoped to the user, and expires
//! after 30 days. A trusted device skips the 2FA challenge entirely; that
//! bypass is an intentional, user-visible trade-off.
//!
//! ## Consumption safety
//!
//! Backup codes are single-use. The stored code list is replaced through a
//! compare-and-swap on the previous envelope, so two devices racing to
//! spend the same code cannot both succeed.
//!
//! This crate is a library: it exposes services plus a thin `axum` router
//! for the dashboard's HTTP tier. Session issuance, rate limiting, and
//! notification delivery remain the host's concern.
//!
//! ## Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use soldi_auth::{
//!     config::{OracleConfig, TwoFactorConfig},
//!     device_trust::DeviceTrustService,
//!     oracle::TransitOracle,
//!     totp::{TotpEngine, TwoFactorService},
//! };
//!
//! # async fn wire(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let config = TwoFactorConfig::from_env();
//! let oracle = Arc::new(TransitOracle::new(&OracleConfig::from_env()?)?);
//! let twofactor =
//!     TwoFactorService::new(pool.clone(), oracle, TotpEngine::new(config.issuer()));
//! let devices = DeviceTrustService::new(pool).with_ttl_days(config.trust_ttl_days());
//! let router = soldi_auth::api::router(twofactor, devices);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod device_trust;
pub mod error;
pub mod oracle;
pub mod totp;
pub mod verify;

pub use error::AuthError;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
