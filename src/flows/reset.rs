//! Password reset by emailed code.
//!
//! Unlike login, this flow tells the caller when an email is unknown — it is
//! self-service recovery, and the requester already claims to own the address.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{Account, LockoutState, StoredCode};
use crate::clock::Clock;
use crate::code::CodeGenerator;
use crate::error::{PortcullisError, Result};
use crate::mailer::{Email, Mailer};
use crate::password::PasswordHasher;
use crate::store::AccountStore;

/// Handles the forgot-password code lifecycle.
pub struct PasswordResetFlow<S: AccountStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    codes: CodeGenerator,
    hasher: PasswordHasher,
    code_ttl: Duration,
    app_name: String,
}

impl<S: AccountStore> PasswordResetFlow<S> {
    /// Create a new reset flow with a 15-minute code lifetime.
    pub fn new(store: S, mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            mailer,
            clock,
            codes: CodeGenerator::new(),
            hasher: PasswordHasher::new(),
            code_ttl: Duration::from_secs(15 * 60),
            app_name: "App".to_string(),
        }
    }

    /// Set the code lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Set the app name used in mail copy.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Issue a reset code to the account's email.
    ///
    /// Errors with `NotFound` for an unknown email.
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let mut account = self.find(email).await?;

        let code = self.codes.numeric();
        account.reset = Some(StoredCode::issue(&code, self.clock.now() + self.code_ttl));
        self.store.save(&account).await?;

        let subject = format!("Reset your {} password", self.app_name);
        let body = format!(
            "Hi,\n\n\
             You requested to reset your password. Use this code:\n\n\
             {code}\n\n\
             This code expires in {} minutes.\n\n\
             If you didn't request this, you can ignore this email.\n\n\
             — {}",
            self.code_ttl.as_secs() / 60,
            self.app_name,
        );
        if let Err(e) = self
            .mailer
            .send(&Email::new(account.email.as_str(), subject, body))
            .await
        {
            tracing::warn!(
                target: "auth.password.reset_mail_failed",
                account_id = account.id,
                error = %e,
                "Failed to send reset email"
            );
        }

        tracing::info!(
            target: "auth.password.reset_requested",
            account_id = account.id,
            expires_in_secs = self.code_ttl.as_secs(),
            "Password reset code issued"
        );
        Ok(())
    }

    /// Redeem a reset code and set a new password.
    ///
    /// A match replaces the password hash, clears the reset code, and clears
    /// any lockout state — a successful reset is proof of ownership strong
    /// enough to unlock the account. A mismatch returns `Ok(false)` and
    /// leaves the code usable until it expires.
    pub async fn reset(&self, email: &str, code: &str, new_password: &str) -> Result<bool> {
        let mut account = self.find(email).await?;

        let Some(stored) = &account.reset else {
            return Err(PortcullisError::precondition_failed(
                "no password reset in progress",
            ));
        };
        if stored.expired(self.clock.now()) {
            return Err(PortcullisError::expired("reset code"));
        }
        if !stored.matches(code.trim()) {
            return Ok(false);
        }

        account.password_hash = self.hasher.hash(new_password);
        account.reset = None;
        account.lockout = LockoutState::default();
        self.store.save(&account).await?;

        tracing::info!(
            target: "auth.password.reset_completed",
            account_id = account.id,
            "Password reset completed"
        );
        Ok(true)
    }

    async fn find(&self, email: &str) -> Result<Account> {
        self.store
            .find_by_email(email.trim())
            .await?
            .ok_or_else(|| PortcullisError::not_found("account"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, Role};
    use crate::store::{AccountCreator, InMemoryAccountStore};
    use crate::testing::{ManualClock, RecordingMailer};
    use std::time::SystemTime;

    struct Fixture {
        flow: PasswordResetFlow<InMemoryAccountStore>,
        store: InMemoryAccountStore,
        mailer: Arc<RecordingMailer>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryAccountStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        let clock = Arc::new(ManualClock::starting_now());
        let flow = PasswordResetFlow::new(store.clone(), mailer.clone(), clock.clone())
            .with_app_name("TestApp");
        Fixture {
            flow,
            store,
            mailer,
            clock,
        }
    }

    async fn account(fx: &Fixture) -> Account {
        let hasher = PasswordHasher::new();
        let mut account = Account::new(
            "user@example.com",
            hasher.hash("OldPassword1"),
            Role::User,
            SystemTime::now(),
        );
        account.status = AccountStatus::Active;
        account.email_verified = true;
        fx.store.create(account).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_email_propagates_not_found() {
        let fx = fixture();
        let err = fx.flow.request_reset("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, PortcullisError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_round_trip() {
        let fx = fixture();
        let created = account(&fx).await;

        fx.flow.request_reset("User@Example.com").await.unwrap();
        let code = fx.mailer.extract_last_numeric_code().unwrap();

        // Wrong code: no change.
        assert!(!fx
            .flow
            .reset("user@example.com", "000000", "NewPassword1")
            .await
            .unwrap());
        let stored = fx.store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, created.password_hash);

        // Right code: password replaced, reset fields cleared.
        assert!(fx
            .flow
            .reset("user@example.com", &code, "NewPassword1")
            .await
            .unwrap());
        let stored = fx.store.find_by_id(created.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, created.password_hash);
        assert!(stored.reset.is_none());

        // The code was single-use.
        let err = fx
            .flow
            .reset("user@example.com", &code, "AnotherPassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_expired_code_is_error() {
        let fx = fixture();
        account(&fx).await;

        fx.flow.request_reset("user@example.com").await.unwrap();
        let code = fx.mailer.extract_last_numeric_code().unwrap();

        fx.clock.advance(Duration::from_secs(16 * 60));
        let err = fx
            .flow
            .reset("user@example.com", &code, "NewPassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, PortcullisError::Expired(_)));
    }

    #[tokio::test]
    async fn test_reset_clears_lockout() {
        let fx = fixture();
        let mut created = account(&fx).await;
        created.lockout.failed_attempts = 2;
        created.lockout.locked_until = Some(SystemTime::now() + Duration::from_secs(1800));
        created.lockout.unlock = Some(StoredCode::issue(
            "654321",
            SystemTime::now() + Duration::from_secs(1800),
        ));
        fx.store.save(&created).await.unwrap();

        fx.flow.request_reset("user@example.com").await.unwrap();
        let code = fx.mailer.extract_last_numeric_code().unwrap();
        assert!(fx
            .flow
            .reset("user@example.com", &code, "NewPassword1")
            .await
            .unwrap());

        let stored = fx.store.find_by_id(created.id).await.unwrap().unwrap();
        assert!(stored.lockout.is_clear());
    }

    #[tokio::test]
    async fn test_reset_without_request_is_error() {
        let fx = fixture();
        account(&fx).await;

        let err = fx
            .flow
            .reset("user@example.com", "123456", "NewPassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }
}
