//! Verification orchestrator: the state machine a sign-in walks through.
//!
//! Flow Overview:
//! 1) Compute the device fingerprint and check for a live trust grant; a
//!    hit skips the challenge entirely (intentional 30-day bypass).
//! 2) Otherwise consult the enrollment: absent or disabled means 2FA is
//!    not required for this user.
//! 3) An enabled enrollment requires a challenge. A submission is matched
//!    against backup codes first, then the TOTP engine.
//!
//! Security boundaries:
//! - Trust-store read failures fail closed: the challenge is required,
//!   never skipped.
//! - Denials return to `AwaitingInput` for retry; lockout/backoff is an
//!   external rate-limiting concern.
//! - Cancellation never mutates persisted 2FA state.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::{
    device_trust::{
        DeviceTrustService,
        models::{DeviceProfile, TrustedDevice},
    },
    error::AuthError,
    totp::{TwoFactorService, models::TwoFactorEnrollment},
};

/// States of one authentication attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeState {
    Unchallenged,
    DeviceTrustCheck,
    TrustedSkip,
    ChallengeRequired,
    AwaitingInput,
    Verifying,
    Verified,
    Denied,
}

/// Why a submission was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    InvalidCode,
}

/// Entry decision after the trust and enrollment checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeEntry {
    /// A live trust grant matched; 2FA is skipped.
    TrustedSkip,
    /// The user has no enabled enrollment; 2FA is not required.
    NotRequired,
    /// A challenge must be answered.
    ChallengeRequired,
}

/// Outcome of one code submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { used_backup_code: bool },
    Denied { reason: DenyReason },
}

/// Enrollment operations the orchestrator needs. Implemented by
/// [`TwoFactorService`]; tests substitute an in-memory store.
#[async_trait]
pub trait EnrollmentGateway: Send + Sync {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>, AuthError>;

    async fn consume_backup_code(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
    ) -> Result<bool, AuthError>;

    async fn validate_code_at(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
        now_unix: u64,
    ) -> Result<bool, AuthError>;
}

/// Trust operations the orchestrator needs. Implemented by
/// [`DeviceTrustService`].
#[async_trait]
pub trait TrustGateway: Send + Sync {
    fn fingerprint(&self, profile: &DeviceProfile) -> String;

    async fn is_trusted(&self, user_id: Uuid, fingerprint: &str) -> Result<bool, AuthError>;

    async fn trust(
        &self,
        user_id: Uuid,
        profile: &DeviceProfile,
    ) -> Result<TrustedDevice, AuthError>;
}

#[async_trait]
impl EnrollmentGateway for TwoFactorService {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>, AuthError> {
        TwoFactorService::fetch(self, user_id).await
    }

    async fn consume_backup_code(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
    ) -> Result<bool, AuthError> {
        TwoFactorService::consume_backup_code(self, enrollment, candidate).await
    }

    async fn validate_code_at(
        &self,
        enrollment: &TwoFactorEnrollment,
        candidate: &str,
        now_unix: u64,
    ) -> Result<bool, AuthError> {
        TwoFactorService::validate_code_at(self, enrollment, candidate, now_unix).await
    }
}

#[async_trait]
impl TrustGateway for DeviceTrustService {
    fn fingerprint(&self, profile: &DeviceProfile) -> String {
        DeviceTrustService::fingerprint(self, profile)
    }

    async fn is_trusted(&self, user_id: Uuid, fingerprint: &str) -> Result<bool, AuthError> {
        DeviceTrustService::is_trusted(self, user_id, fingerprint).await
    }

    async fn trust(
        &self,
        user_id: Uuid,
        profile: &DeviceProfile,
    ) -> Result<TrustedDevice, AuthError> {
        DeviceTrustService::trust(self, user_id, profile).await
    }
}

/// Pure entry decision: given the trust check and the enrollment record,
/// which way does the attempt go?
#[must_use]
pub fn decide_entry(trusted: bool, enrollment: Option<&TwoFactorEnrollment>) -> ChallengeEntry {
    if trusted {
        return ChallengeEntry::TrustedSkip;
    }
    match enrollment {
        Some(enrollment) if enrollment.enabled => ChallengeEntry::ChallengeRequired,
        _ => ChallengeEntry::NotRequired,
    }
}

/// One authentication attempt for one user on one device. Construct at
/// sign-in, drive `begin` → `submit`, drop when done.
pub struct VerificationOrchestrator<E, T> {
    enrollments: E,
    trust: T,
    user_id: Uuid,
    state: ChallengeState,
}

impl<E, T> VerificationOrchestrator<E, T>
where
    E: EnrollmentGateway,
    T: TrustGateway,
{
    #[must_use]
    pub fn new(user_id: Uuid, enrollments: E, trust: T) -> Self {
        Self {
            enrollments,
            trust,
            user_id,
            state: ChallengeState::Unchallenged,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Run the trust and enrollment checks and decide whether a challenge
    /// is required.
    ///
    /// # Errors
    /// Returns an error if the enrollment record cannot be read. Trust
    /// lookups that fail are logged and treated as "not trusted".
    pub async fn begin(&mut self, profile: &DeviceProfile) -> Result<ChallengeEntry, AuthError> {
        self.state = ChallengeState::DeviceTrustCheck;

        let fingerprint = self.trust.fingerprint(profile);
        let trusted = match self.trust.is_trusted(self.user_id, &fingerprint).await {
            Ok(trusted) => trusted,
            Err(err) => {
                // Fail closed: an unreadable trust store must not skip 2FA.
                warn!(user_id = %self.user_id, error = %err, "trust lookup failed, requiring challenge");
                false
            }
        };

        let enrollment = self.enrollments.fetch(self.user_id).await?;
        let entry = decide_entry(trusted, enrollment.as_ref());

        self.state = match entry {
            ChallengeEntry::TrustedSkip => ChallengeState::Verified,
            ChallengeEntry::NotRequired => ChallengeState::Verified,
            ChallengeEntry::ChallengeRequired => ChallengeState::AwaitingInput,
        };

        Ok(entry)
    }

    /// Submit a candidate code using the system clock.
    ///
    /// # Errors
    /// See [`submit_at`](Self::submit_at).
    pub async fn submit(&mut self, candidate: &str) -> Result<VerifyOutcome, AuthError> {
        let now_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("system time error: {err}")))?
            .as_secs();
        self.submit_at(candidate, now_unix).await
    }

    /// Submit a candidate code at an explicit timestamp. Backup codes are
    /// tried first; a consumed code is persisted before the attempt is
    /// reported verified.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidCode`] for an empty candidate,
    /// [`AuthError::NotEnrolled`] if the enrollment vanished mid-attempt,
    /// and propagates resolution, oracle, and consumption errors — those
    /// deny the attempt without being mistaken for a wrong code.
    pub async fn submit_at(
        &mut self,
        candidate: &str,
        now_unix: u64,
    ) -> Result<VerifyOutcome, AuthError> {
        if self.state != ChallengeState::AwaitingInput {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "no challenge awaiting input"
            )));
        }

        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(AuthError::InvalidCode);
        }

        self.state = ChallengeState::Verifying;

        // Re-read the enrollment so backup-code consumption swaps against
        // the freshest envelope.
        let enrollment = match self.enrollments.fetch(self.user_id).await {
            Ok(Some(enrollment)) if enrollment.enabled => enrollment,
            Ok(_) => {
                self.state = ChallengeState::AwaitingInput;
                return Err(AuthError::NotEnrolled);
            }
            Err(err) => {
                self.state = ChallengeState::AwaitingInput;
                return Err(err);
            }
        };

        match self
            .enrollments
            .consume_backup_code(&enrollment, candidate)
            .await
        {
            Ok(true) => {
                self.state = ChallengeState::Verified;
                return Ok(VerifyOutcome::Verified {
                    used_backup_code: true,
                });
            }
            Ok(false) => {}
            Err(err) => {
                self.state = ChallengeState::AwaitingInput;
                return Err(err);
            }
        }

        match self
            .enrollments
            .validate_code_at(&enrollment, candidate, now_unix)
            .await
        {
            Ok(true) => {
                self.state = ChallengeState::Verified;
                Ok(VerifyOutcome::Verified {
                    used_backup_code: false,
                })
            }
            Ok(false) => {
                // Denied, but the user may retry.
                self.state = ChallengeState::AwaitingInput;
                Ok(VerifyOutcome::Denied {
                    reason: DenyReason::InvalidCode,
                })
            }
            Err(err) => {
                self.state = ChallengeState::AwaitingInput;
                Err(err)
            }
        }
    }

    /// Grant trust to the current device after a successful verification.
    ///
    /// # Errors
    /// Returns an error unless the attempt is in the `Verified` state, or
    /// if the grant cannot be persisted.
    pub async fn remember_device(
        &self,
        profile: &DeviceProfile,
    ) -> Result<TrustedDevice, AuthError> {
        if self.state != ChallengeState::Verified {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "device can only be remembered after verification"
            )));
        }
        self.trust.trust(self.user_id, profile).await
    }

    /// Abort an in-progress attempt. Persisted 2FA state is untouched;
    /// returns false when there is nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            ChallengeState::DeviceTrustCheck
            | ChallengeState::ChallengeRequired
            | ChallengeState::AwaitingInput
            | ChallengeState::Verifying => {
                self.state = ChallengeState::Unchallenged;
                true
            }
            ChallengeState::Unchallenged
            | ChallengeState::TrustedSkip
            | ChallengeState::Verified
            | ChallengeState::Denied => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::totp::{backup, engine::TotpEngine, models::enrollment_fixture};
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    // RFC 6238 appendix B secret; 6-digit SHA1 code at T=59 is 287082.
    const SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const NOW: u64 = 59;
    const CODE: &str = "287082";

    struct MemoryEnrollments {
        enrollment: Option<TwoFactorEnrollment>,
        codes: Mutex<Vec<String>>,
        engine: TotpEngine,
    }

    impl MemoryEnrollments {
        fn enrolled(codes: Vec<&str>) -> Self {
            let mut enrollment = enrollment_fixture(Uuid::new_v4());
            enrollment.secret_plain = Some(SECRET.to_string());
            Self {
                enrollment: Some(enrollment),
                codes: Mutex::new(codes.into_iter().map(str::to_string).collect()),
                engine: TotpEngine::new("Soldi"),
            }
        }

        fn not_enrolled() -> Self {
            Self {
                enrollment: None,
                codes: Mutex::new(Vec::new()),
                engine: TotpEngine::new("Soldi"),
            }
        }

        fn disabled(mut self) -> Self {
            if let Some(enrollment) = self.enrollment.as_mut() {
                enrollment.enabled = false;
            }
            self
        }

        fn user_id(&self) -> Uuid {
            self.enrollment
                .as_ref()
                .map_or_else(Uuid::new_v4, |enrollment| enrollment.user_id)
        }

        fn remaining_codes(&self) -> Vec<String> {
            self.codes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<'a> EnrollmentGateway for &'a MemoryEnrollments {
        async fn fetch(&self, _user_id: Uuid) -> Result<Option<TwoFactorEnrollment>, AuthError> {
            Ok(self.enrollment.clone())
        }

        async fn consume_backup_code(
            &self,
            _enrollment: &TwoFactorEnrollment,
            candidate: &str,
        ) -> Result<bool, AuthError> {
            let mut codes = self.codes.lock().unwrap();
            let consumption = backup::consume(&codes, candidate);
            if consumption.matched {
                *codes = consumption.remaining;
            }
            Ok(consumption.matched)
        }

        async fn validate_code_at(
            &self,
            _enrollment: &TwoFactorEnrollment,
            candidate: &str,
            now_unix: u64,
        ) -> Result<bool, AuthError> {
            self.engine.validate_at(SECRET, candidate, now_unix, 2)
        }
    }

    struct MemoryTrust {
        trusted_fingerprints: Vec<String>,
        fail_lookup: bool,
        granted: Mutex<Vec<String>>,
    }

    impl MemoryTrust {
        fn new() -> Self {
            Self {
                trusted_fingerprints: Vec::new(),
                fail_lookup: false,
                granted: Mutex::new(Vec::new()),
            }
        }

        fn trusting(profile: &DeviceProfile) -> Self {
            let mut trust = Self::new();
            trust
                .trusted_fingerprints
                .push(crate::device_trust::fingerprint(profile));
            trust
        }

        fn failing() -> Self {
            let mut trust = Self::new();
            trust.fail_lookup = true;
            trust
        }
    }

    #[async_trait]
    impl<'a> TrustGateway for &'a MemoryTrust {
        fn fingerprint(&self, profile: &DeviceProfile) -> String {
            crate::device_trust::fingerprint(profile)
        }

        async fn is_trusted(&self, _user_id: Uuid, fingerprint: &str) -> Result<bool, AuthError> {
            if self.fail_lookup {
                return Err(AuthError::DeviceTrust(sqlx::Error::RowNotFound));
            }
            Ok(self
                .trusted_fingerprints
                .iter()
                .any(|trusted| trusted == fingerprint))
        }

        async fn trust(
            &self,
            user_id: Uuid,
            profile: &DeviceProfile,
        ) -> Result<TrustedDevice, AuthError> {
            let fingerprint = crate::device_trust::fingerprint(profile);
            self.granted.lock().unwrap().push(fingerprint.clone());
            let now = Utc::now();
            Ok(TrustedDevice {
                id: Uuid::new_v4(),
                user_id,
                device_fingerprint: fingerprint,
                device_name: crate::device_trust::device_name(profile),
                created_at: now,
                last_used_at: now,
                expires_at: now + Duration::days(30),
            })
        }
    }

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
    fn decide_entry_covers_all_branches() {
        let mut enrollment = enrollment_fixture(Uuid::new_v4());
        enrollment.secret_plain = Some(SECRET.to_string());

        assert_eq!(
            decide_entry(true, Some(&enrollment)),
            ChallengeEntry::TrustedSkip
        );
        assert_eq!(decide_entry(true, None), ChallengeEntry::TrustedSkip);
        assert_eq!(decide_entry(false, None), ChallengeEntry::NotRequired);
        assert_eq!(
            decide_entry(false, Some(&enrollment)),
            ChallengeEntry::ChallengeRequired
        );

        enrollment.enabled = false;
        assert_eq!(
            decide_entry(false, Some(&enrollment)),
            ChallengeEntry::NotRequired
        );
    }

    #[tokio::test]
    async fn trusted_device_skips_challenge() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::trusting(&profile());
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);

        let entry = attempt.begin(&profile()).await.unwrap();
        assert_eq!(entry, ChallengeEntry::TrustedSkip);
        assert_eq!(attempt.state(), ChallengeState::Verified);
    }

    #[tokio::test]
    async fn unenrolled_user_is_not_challenged() {
        let enrollments = MemoryEnrollments::not_enrolled();
        let trust = MemoryTrust::new();
        let mut attempt = VerificationOrchestrator::new(Uuid::new_v4(), &enrollments, &trust);

        let entry = attempt.begin(&profile()).await.unwrap();
        assert_eq!(entry, ChallengeEntry::NotRequired);
        assert_eq!(attempt.state(), ChallengeState::Verified);
    }

    #[tokio::test]
    async fn disabled_enrollment_is_not_challenged() {
        let enrollments = MemoryEnrollments::enrolled(vec![]).disabled();
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);

        let entry = attempt.begin(&profile()).await.unwrap();
        assert_eq!(entry, ChallengeEntry::NotRequired);
    }

    #[tokio::test]
    async fn totp_code_verifies() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);

        let entry = attempt.begin(&profile()).await.unwrap();
        assert_eq!(entry, ChallengeEntry::ChallengeRequired);
        assert_eq!(attempt.state(), ChallengeState::AwaitingInput);

        let outcome = attempt.submit_at(CODE, NOW).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                used_backup_code: false
            }
        );
        assert_eq!(attempt.state(), ChallengeState::Verified);
    }

    #[tokio::test]
    async fn wrong_code_is_denied_and_retry_succeeds() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        attempt.begin(&profile()).await.unwrap();

        let outcome = attempt.submit_at("000000", NOW).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Denied {
                reason: DenyReason::InvalidCode
            }
        );
        assert_eq!(attempt.state(), ChallengeState::AwaitingInput);

        let outcome = attempt.submit_at(CODE, NOW).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                used_backup_code: false
            }
        );
    }

    #[tokio::test]
    async fn backup_code_is_single_use() {
        let enrollments = MemoryEnrollments::enrolled(vec!["AB12CD34", "EF56GH78"]);
        let trust = MemoryTrust::new();

        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        attempt.begin(&profile()).await.unwrap();

        let outcome = attempt.submit_at("ab12cd34", NOW).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                used_backup_code: true
            }
        );
        assert_eq!(
            enrollments.remaining_codes(),
            vec!["EF56GH78".to_string()]
        );

        // Second attempt with the spent code: denied.
        let mut retry =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        retry.begin(&profile()).await.unwrap();
        let outcome = retry.submit_at("AB12CD34", NOW).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Denied {
                reason: DenyReason::InvalidCode
            }
        );
    }

    #[tokio::test]
    async fn empty_candidate_is_rejected_without_storage_access() {
        let enrollments = MemoryEnrollments::enrolled(vec!["AB12CD34"]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        attempt.begin(&profile()).await.unwrap();

        let result = attempt.submit_at("   ", NOW).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));
        assert_eq!(attempt.state(), ChallengeState::AwaitingInput);
        assert_eq!(enrollments.remaining_codes(), vec!["AB12CD34".to_string()]);
    }

    #[tokio::test]
    async fn trust_store_failure_fails_closed() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::failing();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);

        let entry = attempt.begin(&profile()).await.unwrap();
        assert_eq!(entry, ChallengeEntry::ChallengeRequired);
    }

    #[tokio::test]
    async fn cancel_aborts_without_mutating_state() {
        let enrollments = MemoryEnrollments::enrolled(vec!["AB12CD34"]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        attempt.begin(&profile()).await.unwrap();

        assert!(attempt.cancel());
        assert_eq!(attempt.state(), ChallengeState::Unchallenged);
        assert_eq!(enrollments.remaining_codes(), vec!["AB12CD34".to_string()]);
        assert!(trust.granted.lock().unwrap().is_empty());

        // Nothing left to cancel.
        assert!(!attempt.cancel());
    }

    #[tokio::test]
    async fn submit_without_begin_is_an_error() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);

        let result = attempt.submit_at(CODE, NOW).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn remember_device_requires_verification() {
        let enrollments = MemoryEnrollments::enrolled(vec![]);
        let trust = MemoryTrust::new();
        let mut attempt =
            VerificationOrchestrator::new(enrollments.user_id(), &enrollments, &trust);
        attempt.begin(&profile()).await.unwrap();

        assert!(attempt.remember_device(&profile()).await.is_err());

        attempt.submit_at(CODE, NOW).await.unwrap();
        let device = attempt.remember_device(&profile()).await.unwrap();
        assert_eq!(device.device_name, "Firefox on Linux");
        assert_eq!(trust.granted.lock().unwrap().len(), 1);
    }
}
