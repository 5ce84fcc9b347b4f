//! Brute-force lockout.
//!
//! Tracks consecutive failed password attempts on the account and enforces a
//! timed lock once the threshold is reached. Locking issues a one-time unlock
//! code by email as an escape hatch; the lock also lifts by itself when the
//! window elapses.
//!
//! Mutation methods operate on the [`Account`] in memory and report whether
//! they changed anything; the calling flow persists and, for lock
//! notifications, mails only after the state change is saved.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{Account, LockoutState, StoredCode};
use crate::clock::Clock;
use crate::code::CodeGenerator;
use crate::error::{PortcullisError, Result};
use crate::mailer::{Email, Mailer};

/// Default failed attempts before the account locks.
const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default lock duration (30 minutes).
const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30 * 60);

/// Default unlock-code lifetime (30 minutes).
const DEFAULT_UNLOCK_CODE_TTL: Duration = Duration::from_secs(30 * 60);

/// Lockout policy configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failed attempts before the account is locked.
    pub max_attempts: u32,
    /// How long the account stays locked.
    pub lock_duration: Duration,
    /// How long the emailed unlock code stays valid.
    pub unlock_code_ttl: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_duration: DEFAULT_LOCK_DURATION,
            unlock_code_ttl: DEFAULT_UNLOCK_CODE_TTL,
        }
    }
}

impl LockoutPolicy {
    /// Create a new policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failed-attempt threshold.
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the lock duration.
    #[must_use]
    pub fn lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }

    /// Set the unlock-code lifetime.
    #[must_use]
    pub fn unlock_code_ttl(mut self, ttl: Duration) -> Self {
        self.unlock_code_ttl = ttl;
        self
    }
}

/// Raw unlock code produced when a failure trips the lock.
///
/// Handed back to the flow so the notification mail goes out only after the
/// account mutation is persisted.
pub struct LockoutNotice {
    unlock_code: String,
}

/// Enforces the lockout policy on account state.
pub struct Lockout {
    policy: LockoutPolicy,
    codes: CodeGenerator,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    app_name: String,
}

impl Lockout {
    /// Create a new lockout manager.
    pub fn new(
        policy: LockoutPolicy,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            codes: CodeGenerator::new(),
            mailer,
            clock,
            app_name: app_name.into(),
        }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Record a failed password attempt.
    ///
    /// When the counter reaches the threshold this sets the lock window and
    /// stores a hashed unlock code, returning the raw code for notification
    /// via [`send_lock_notice`] once the account is persisted.
    ///
    /// [`send_lock_notice`]: Self::send_lock_notice
    pub fn record_failure(&self, account: &mut Account) -> Option<LockoutNotice> {
        account.lockout.failed_attempts += 1;

        if account.lockout.failed_attempts < self.policy.max_attempts {
            return None;
        }

        let now = self.clock.now();
        let unlock_code = self.codes.numeric();
        account.lockout.locked_until = Some(now + self.policy.lock_duration);
        account.lockout.unlock = Some(StoredCode::issue(
            &unlock_code,
            now + self.policy.unlock_code_ttl,
        ));

        tracing::warn!(
            target: "auth.lockout.account_locked",
            account_id = account.id,
            attempts = account.lockout.failed_attempts,
            duration_secs = self.policy.lock_duration.as_secs(),
            "Account locked due to failed attempts"
        );

        Some(LockoutNotice { unlock_code })
    }

    /// Email the unlock code for a lock that was just persisted.
    ///
    /// Delivery is best-effort; failures are logged and swallowed.
    pub async fn send_lock_notice(&self, account: &Account, notice: LockoutNotice) {
        let subject = format!("Your {} account has been locked", self.app_name);
        let body = format!(
            "Hi,\n\n\
             Your account has been locked due to {} failed login attempts.\n\n\
             Use this code to unlock your account:\n\n\
             {}\n\n\
             This code expires in {} minutes.\n\n\
             If you didn't try to log in, please reset your password immediately.\n\n\
             — {}",
            self.policy.max_attempts,
            notice.unlock_code,
            self.policy.unlock_code_ttl.as_secs() / 60,
            self.app_name,
        );

        if let Err(e) = self
            .mailer
            .send(&Email::new(account.email.as_str(), subject, body))
            .await
        {
            tracing::warn!(
                target: "auth.lockout.notification_failed",
                account_id = account.id,
                error = %e,
                "Failed to send lockout notification email"
            );
        } else {
            tracing::info!(
                target: "auth.lockout.notification_sent",
                account_id = account.id,
                "Lockout notification email sent"
            );
        }
    }

    /// Clear all lockout state after a successful password check.
    ///
    /// Returns whether anything was cleared.
    pub fn record_success(&self, account: &mut Account) -> bool {
        if account.lockout.is_clear() {
            return false;
        }
        account.lockout = LockoutState::default();
        tracing::debug!(
            target: "auth.lockout.cleared",
            account_id = account.id,
            "Lockout state cleared on successful password check"
        );
        true
    }

    /// Whether the account is currently locked.
    ///
    /// An expired lock is cleared as a side effect (counter, window, and
    /// unlock code) and reported as not locked; the caller should persist.
    pub fn is_locked(&self, account: &mut Account) -> bool {
        let Some(until) = account.lockout.locked_until else {
            return false;
        };

        if until < self.clock.now() {
            account.lockout = LockoutState::default();
            tracing::debug!(
                target: "auth.lockout.expired",
                account_id = account.id,
                "Lock window elapsed; lockout state cleared"
            );
            return false;
        }

        true
    }

    /// Redeem an emailed unlock code.
    ///
    /// Errors if no code is on record or the code's window elapsed. A
    /// mismatch returns `Ok(false)` without touching state; a match clears
    /// all lockout state.
    pub fn unlock(&self, account: &mut Account, candidate: &str) -> Result<bool> {
        let Some(stored) = &account.lockout.unlock else {
            return Err(PortcullisError::precondition_failed(
                "no unlock code available",
            ));
        };

        if stored.expired(self.clock.now()) {
            return Err(PortcullisError::expired("unlock code"));
        }

        if !stored.matches(candidate.trim()) {
            return Ok(false);
        }

        account.lockout = LockoutState::default();
        tracing::info!(
            target: "auth.lockout.unlocked",
            account_id = account.id,
            "Account unlocked with emailed code"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Role;
    use crate::testing::{ManualClock, RecordingMailer};
    use std::time::SystemTime;

    fn account() -> Account {
        let mut account = Account::new("user@example.com", "hash", Role::User, SystemTime::now());
        account.id = 1;
        account
    }

    fn lockout(clock: Arc<ManualClock>, mailer: Arc<RecordingMailer>) -> Lockout {
        Lockout::new(LockoutPolicy::default(), mailer, clock, "TestApp")
    }

    #[tokio::test]
    async fn test_threshold_trips_lock_with_unlock_code() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        let lockout = lockout(clock.clone(), mailer.clone());
        let mut account = account();

        assert!(lockout.record_failure(&mut account).is_none());
        assert_eq!(account.lockout.failed_attempts, 1);
        assert!(!lockout.is_locked(&mut account));

        let notice = lockout.record_failure(&mut account).expect("lock trips at 2");
        assert!(lockout.is_locked(&mut account));
        let unlock = account.lockout.unlock.as_ref().unwrap();
        assert!(unlock.expires_at > clock.now());

        lockout.send_lock_notice(&account, notice).await;
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
    }

    #[tokio::test]
    async fn test_success_clears_state() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        let lockout = lockout(clock, mailer);
        let mut account = account();

        lockout.record_failure(&mut account);
        assert!(lockout.record_success(&mut account));
        assert!(account.lockout.is_clear());

        // Nothing left to clear.
        assert!(!lockout.record_success(&mut account));
    }

    #[tokio::test]
    async fn test_lock_expires_and_clears() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        let lockout = lockout(clock.clone(), mailer);
        let mut account = account();

        lockout.record_failure(&mut account);
        lockout.record_failure(&mut account);
        assert!(lockout.is_locked(&mut account));

        clock.advance(Duration::from_secs(31 * 60));
        assert!(!lockout.is_locked(&mut account));
        assert!(account.lockout.is_clear());
    }

    #[tokio::test]
    async fn test_unlock_with_code() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        let lockout = lockout(clock.clone(), mailer.clone());
        let mut account = account();

        lockout.record_failure(&mut account);
        let notice = lockout.record_failure(&mut account).unwrap();
        lockout.send_lock_notice(&account, notice).await;

        let code = mailer.extract_numeric_code(0).unwrap();

        // Wrong code leaves the lock in place.
        assert!(!lockout.unlock(&mut account, "000000").unwrap());
        assert!(lockout.is_locked(&mut account));

        assert!(lockout.unlock(&mut account, &code).unwrap());
        assert!(account.lockout.is_clear());
    }

    #[tokio::test]
    async fn test_unlock_without_code_is_error() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        let lockout = lockout(clock, mailer);
        let mut account = account();

        let err = lockout.unlock(&mut account, "123456").unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_unlock_with_expired_code_is_error() {
        let clock = Arc::new(ManualClock::starting_now());
        let mailer = Arc::new(RecordingMailer::new());
        // Unlock code outlives the lock so expiry needs its own window.
        let lockout = Lockout::new(
            LockoutPolicy::new().lock_duration(Duration::from_secs(3600)),
            mailer.clone(),
            clock.clone(),
            "TestApp",
        );
        let mut account = account();

        lockout.record_failure(&mut account);
        lockout.record_failure(&mut account);

        clock.advance(Duration::from_secs(31 * 60));
        let err = lockout.unlock(&mut account, "123456").unwrap_err();
        assert!(matches!(err, PortcullisError::Expired(_)));
    }
}
