//! Environment-driven configuration for the two-factor core.
//!
//! The only secret material this process holds is the bearer token for the
//! encryption oracle; the symmetric key itself never leaves that service.

use secrecy::SecretString;

const DEFAULT_ISSUER: &str = "Soldi";
const DEFAULT_TRUST_TTL_DAYS: i64 = 30;

const ENV_ORACLE_URL: &str = "SOLDI_ORACLE_URL";
const ENV_ORACLE_TOKEN: &str = "SOLDI_ORACLE_TOKEN";
const ENV_ISSUER: &str = "SOLDI_2FA_ISSUER";
const ENV_TRUST_TTL_DAYS: &str = "SOLDI_TRUST_TTL_DAYS";

/// Connection settings for the remote encryption oracle.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    url: String,
    token: SecretString,
}

impl OracleConfig {
    #[must_use]
    pub fn new(url: String, token: SecretString) -> Self {
        Self { url, token }
    }

    /// Load oracle settings from `SOLDI_ORACLE_URL` / `SOLDI_ORACLE_TOKEN`.
    ///
    /// # Errors
    /// Returns an error if either variable is unset or empty.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = require_env(ENV_ORACLE_URL)?;
        let token = require_env(ENV_ORACLE_TOKEN)?;
        Ok(Self::new(url, SecretString::from(token)))
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn token(&self) -> &SecretString {
        &self.token
    }
}

/// Tunables for enrollment and device trust.
#[derive(Clone, Debug)]
pub struct TwoFactorConfig {
    issuer: String,
    trust_ttl_days: i64,
}

impl TwoFactorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            trust_ttl_days: DEFAULT_TRUST_TTL_DAYS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_trust_ttl_days(mut self, days: i64) -> Self {
        self.trust_ttl_days = days;
        self
    }

    /// Load tunables from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Ok(issuer) = std::env::var(ENV_ISSUER) {
            let issuer = issuer.trim().to_string();
            if !issuer.is_empty() {
                config.issuer = issuer;
            }
        }
        if let Some(days) = parse_i64_env(ENV_TRUST_TTL_DAYS) {
            if days > 0 {
                config.trust_ttl_days = days;
            }
        }
        config
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn trust_ttl_days(&self) -> i64 {
        self.trust_ttl_days
    }
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    value.ok_or_else(|| anyhow::anyhow!("{key} is not set"))
}

fn parse_i64_env(key: &str) -> Option<i64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_are_sane() {
        let config = TwoFactorConfig::new();
        assert_eq!(config.issuer(), "Soldi");
        assert_eq!(config.trust_ttl_days(), 30);
    }

    #[test]
    fn builders_override_defaults() {
        let config = TwoFactorConfig::new()
            .with_issuer("Soldi Staging")
            .with_trust_ttl_days(7);
        assert_eq!(config.issuer(), "Soldi Staging");
        assert_eq!(config.trust_ttl_days(), 7);
    }

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                (ENV_ISSUER, Some("Soldi Dev")),
                (ENV_TRUST_TTL_DAYS, Some("14")),
            ],
            || {
                let config = TwoFactorConfig::from_env();
                assert_eq!(config.issuer(), "Soldi Dev");
                assert_eq!(config.trust_ttl_days(), 14);
            },
        );
    }

    #[test]
    fn from_env_ignores_invalid_ttl() {
        temp_env::with_vars([(ENV_TRUST_TTL_DAYS, Some("-3"))], || {
            let config = TwoFactorConfig::from_env();
            assert_eq!(config.trust_ttl_days(), 30);
        });
    }

    #[test]
    fn oracle_config_from_env_requires_both_values() {
        temp_env::with_vars(
            [
                (ENV_ORACLE_URL, Some("https://oracle.soldi.app")),
                (ENV_ORACLE_TOKEN, None::<&str>),
            ],
            || {
                assert!(OracleConfig::from_env().is_err());
            },
        );

        temp_env::with_vars(
            [
                (ENV_ORACLE_URL, Some("https://oracle.soldi.app")),
                (ENV_ORACLE_TOKEN, Some("token")),
            ],
            || {
                let config = OracleConfig::from_env().unwrap();
                assert_eq!(config.url(), "https://oracle.soldi.app");
                assert_eq!(config.token().expose_secret(), "token");
            },
        );
    }
}
