//! TOTP enrollment: engine, backup codes, storage, and lifecycle service.

pub mod backup;
pub mod engine;
pub mod models;
pub mod repo;
pub mod service;

pub use engine::{Provisioning, TotpEngine};
pub use models::{SecretMaterial, TwoFactorEnrollment};
pub use service::{EnabledEnrollment, TwoFactorService};
