//! Deterministic device fingerprinting.
//!
//! The fingerprint recognizes a returning browser; it is not a
//! cryptographic identity. Lookups are always scoped by user, so a
//! cross-user collision is harmless, and a collision between a user's own
//! devices only costs an extra challenge.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::device_trust::models::DeviceProfile;

/// Versioned so a future change to the input set invalidates old grants
/// instead of colliding with them.
const FINGERPRINT_VERSION: &str = "v1";

/// Derive the stable fingerprint for a client profile. Same profile in,
/// same fingerprint out, across sessions; a different browser or OS
/// produces a different value.
#[must_use]
pub fn fingerprint(profile: &DeviceProfile) -> String {
    let canonical = format!(
        "device-fp:{FINGERPRINT_VERSION}|{}|{}|{}x{}|{}|{}",
        profile.user_agent,
        profile.language,
        profile.screen_width,
        profile.screen_height,
        profile.timezone_offset_minutes,
        profile.canvas_signature,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Human-readable "browser on OS" label for the trusted-device list.
#[must_use]
pub fn device_name(profile: &DeviceProfile) -> String {
    let os = os_label(&profile.user_agent);
    let browser = browser_label(&profile.user_agent);
    match (browser, os) {
        (Some(browser), Some(os)) => format!("{browser} on {os}"),
        (Some(browser), None) => browser.to_string(),
        (None, Some(os)) => os.to_string(),
        (None, None) => "Unknown device".to_string(),
    }
}

fn os_label(user_agent: &str) -> Option<&'static str> {
    // iPhone/iPad before Macintosh: mobile Safari UAs mention both.
    if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        Some("iOS")
    } else if user_agent.contains("Android") {
        Some("Android")
    } else if user_agent.contains("Windows") {
        Some("Windows")
    } else if user_agent.contains("Macintosh") || user_agent.contains("Mac OS X") {
        Some("macOS")
    } else if user_agent.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}

fn browser_label(user_agent: &str) -> Option<&'static str> {
    // Order matters: Chromium UAs contain "Chrome" and "Safari"; Edge and
    // Opera additionally contain their own token.
    if user_agent.contains("Edg/") {
        Some("Edge")
    } else if user_agent.contains("OPR/") {
        Some("Opera")
    } else if user_agent.contains("Firefox/") {
        Some("Firefox")
    } else if user_agent.contains("Chrome/") {
        Some("Chrome")
    } else if user_agent.contains("Safari/") {
        Some("Safari")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> DeviceProfile {
        DeviceProfile {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0"
                .to_string(),
            language: "en-US".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            timezone_offset_minutes: -60,
            canvas_signature: "c9a1f3".to_string(),
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(&profile()), fingerprint(&profile()));
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = fingerprint(&profile());

        let mut changed = profile();
        changed.user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
             AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
            .to_string();
        assert_ne!(fingerprint(&changed), base);

        let mut changed = profile();
        changed.timezone_offset_minutes = 0;
        assert_ne!(fingerprint(&changed), base);

        let mut changed = profile();
        changed.canvas_signature = "000000".to_string();
        assert_ne!(fingerprint(&changed), base);
    }

    #[test]
    fn fingerprint_is_url_safe() {
        let value = fingerprint(&profile());
        assert!(
            value
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        );
    }

    #[test]
    fn device_name_identifies_firefox_on_linux() {
        assert_eq!(device_name(&profile()), "Firefox on Linux");
    }

    #[test]
    fn device_name_prefers_specific_browser_tokens() {
        let mut edge = profile();
        edge.user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0"
            .to_string();
        assert_eq!(device_name(&edge), "Edge on Windows");

        let mut safari = profile();
        safari.user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
            .to_string();
        assert_eq!(device_name(&safari), "Safari on macOS");

        let mut ios = profile();
        ios.user_agent = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
             AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
            .to_string();
        assert_eq!(device_name(&ios), "Safari on iOS");
    }

    #[test]
    fn device_name_falls_back_when_unrecognized() {
        let mut unknown = profile();
        unknown.user_agent = "curl/8.5.0".to_string();
        assert_eq!(device_name(&unknown), "Unknown device");
    }
}
