//! Email-ownership verification flow.
//!
//! A registration-time code proves the address belongs to the registrant;
//! verifying it activates the account.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{Account, AccountStatus, StoredCode};
use crate::clock::Clock;
use crate::code::CodeGenerator;
use crate::error::{PortcullisError, Result};
use crate::mailer::{Email, Mailer};
use crate::store::AccountStore;

/// Handles the email verification code lifecycle.
pub struct EmailVerificationFlow<S: AccountStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    codes: CodeGenerator,
    code_ttl: Duration,
    app_name: String,
}

impl<S: AccountStore> EmailVerificationFlow<S> {
    /// Create a new verification flow with a 15-minute code lifetime.
    pub fn new(store: S, mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            mailer,
            clock,
            codes: CodeGenerator::new(),
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

    /// Issue a fresh verification code: store its digest with an expiry,
    /// persist, then email the raw code (best-effort).
    pub async fn issue(&self, account: &mut Account) -> Result<()> {
        let code = self.codes.numeric();
        account.verification = Some(StoredCode::issue(
            &code,
            self.clock.now() + self.code_ttl,
        ));
        self.store.save(account).await?;

        let subject = format!("Verify your {} account", self.app_name);
        let body = format!(
            "Hi,\n\n\
             Thanks for registering with {}. Please verify your email using this code:\n\n\
             {code}\n\n\
             This code expires in {} minutes.\n\n\
             If you didn't request this, you can ignore this email.\n\n\
             — {}",
            self.app_name,
            self.code_ttl.as_secs() / 60,
            self.app_name,
        );
        if let Err(e) = self
            .mailer
            .send(&Email::new(account.email.as_str(), subject, body))
            .await
        {
            tracing::warn!(
                target: "auth.verification.mail_failed",
                account_id = account.id,
                error = %e,
                "Failed to send verification email"
            );
        }

        tracing::info!(
            target: "auth.verification.issued",
            account_id = account.id,
            expires_in_secs = self.code_ttl.as_secs(),
            "Verification code issued"
        );
        Ok(())
    }

    /// Verify a code for the given email.
    ///
    /// Already-verified accounts short-circuit to `Ok(true)` without touching
    /// state. A match marks the email verified, activates the account, and
    /// clears the code; a mismatch returns `Ok(false)` and leaves the code
    /// usable until it expires.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool> {
        let mut account = self.find(email).await?;

        if account.email_verified {
            return Ok(true);
        }

        let Some(stored) = &account.verification else {
            return Err(PortcullisError::precondition_failed(
                "no verification in progress",
            ));
        };
        if stored.expired(self.clock.now()) {
            return Err(PortcullisError::expired("verification code"));
        }
        if !stored.matches(code.trim()) {
            return Ok(false);
        }

        account.email_verified = true;
        account.status = AccountStatus::Active;
        account.verification = None;
        self.store.save(&account).await?;

        tracing::info!(
            target: "auth.verification.completed",
            account_id = account.id,
            "Email verified; account activated"
        );
        Ok(true)
    }

    /// Re-issue the verification code for an unverified account.
    pub async fn resend_if_pending(&self, email: &str) -> Result<()> {
        let mut account = self.find(email).await?;

        if account.email_verified {
            return Err(PortcullisError::conflict("email already verified"));
        }

        self.issue(&mut account).await
    }

    async fn find(&self, email: &str) -> Result<Account> {
        self.store
            .find_by_email(email.trim())
            .await?
            .ok_or_else(|| PortcullisError::not_found("account"))
    }
}
