//! Device-trust management: fingerprinting, grants, expiry.

pub mod fingerprint;
pub mod models;
pub mod repo;
pub mod service;

pub use fingerprint::{device_name, fingerprint};
pub use models::{DeviceProfile, TrustedDevice};
pub use service::DeviceTrustService;
