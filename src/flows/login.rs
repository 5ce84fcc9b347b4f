//! Login flow: credential check, lockout, second factor, token issuance.
//!
//! Each attempt is stateless from the caller's side — everything that has to
//! survive between the first call and the code-bearing retry lives on the
//! account record. A client completing a second factor resubmits email,
//! password, and code together.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::account::{Account, AccountStatus, SecondFactor, StoredCode};
use crate::clock::Clock;
use crate::code::CodeGenerator;
use crate::error::{PortcullisError, Result};
use crate::lockout::{Lockout, LockoutPolicy};
use crate::mailer::{Email, Mailer};
use crate::password::PasswordHasher;
use crate::store::AccountStore;
use crate::token::TokenIssuer;
use crate::totp::{TotpConfig, TotpEngine};

use super::types::{LoginOutcome, LoginRequest};

/// Configuration for the login flow.
#[derive(Clone)]
pub struct LoginFlowConfig {
    /// App name used in mail copy and as the TOTP issuer.
    pub app_name: String,
    /// Lifetime of emailed login codes.
    pub email_code_ttl: Duration,
}

impl Default for LoginFlowConfig {
    fn default() -> Self {
        Self {
            app_name: "App".to_string(),
            email_code_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl LoginFlowConfig {
    /// Create a new login flow config with the given app name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Set the emailed login-code lifetime.
    #[must_use]
    pub fn email_code_ttl(mut self, ttl: Duration) -> Self {
        self.email_code_ttl = ttl;
        self
    }
}

/// Handles login, including the second-factor branch and account unlock.
pub struct AuthenticationFlow<S: AccountStore> {
    store: S,
    hasher: PasswordHasher,
    totp: TotpEngine,
    tokens: TokenIssuer,
    codes: CodeGenerator,
    lockout: Lockout,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: LoginFlowConfig,
}

impl<S: AccountStore> AuthenticationFlow<S> {
    /// Create a new login flow with the default lockout policy.
    pub fn new(
        store: S,
        tokens: TokenIssuer,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: LoginFlowConfig,
    ) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
            totp: TotpEngine::new(TotpConfig::new(config.app_name.as_str())),
            tokens,
            codes: CodeGenerator::new(),
            lockout: Lockout::new(
                LockoutPolicy::default(),
                mailer.clone(),
                clock.clone(),
                config.app_name.clone(),
            ),
            mailer,
            clock,
            config,
        }
    }

    /// Replace the lockout policy.
    #[must_use]
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = Lockout::new(
            policy,
            self.mailer.clone(),
            self.clock.clone(),
            self.config.app_name.clone(),
        );
        self
    }

    /// Replace the TOTP configuration.
    #[must_use]
    pub fn with_totp_config(mut self, config: TotpConfig) -> Self {
        self.totp = TotpEngine::new(config);
        self
    }

    /// Attempt a login.
    ///
    /// The outcome is `Rejected`, `SecondFactorPending`, or `Authenticated`
    /// with a signed token; rejection messages never reveal whether the email
    /// exists.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome> {
        let email = req.email.trim().to_lowercase();

        let Some(mut account) = self.store.find_by_email(&email).await? else {
            return Ok(LoginOutcome::rejected("Invalid email or password"));
        };

        if !self.hasher.verify(&req.password, &account.password_hash) {
            let notice = self.lockout.record_failure(&mut account);
            self.store.save(&account).await?;
            if let Some(notice) = notice {
                self.lockout.send_lock_notice(&account, notice).await;
            }
            return Ok(LoginOutcome::rejected("Invalid email or password"));
        }

        // A correct password on a locked account does not count as a failure,
        // but it does not get in either.
        let had_lock = account.lockout.locked_until.is_some();
        if self.lockout.is_locked(&mut account) {
            return Ok(LoginOutcome::rejected(
                "Account is locked due to failed login attempts. \
                 Check your email for an unlock code.",
            ));
        }
        if had_lock {
            // The lock window elapsed and was cleared; persist that.
            self.store.save(&account).await?;
        }

        if account.status != AccountStatus::Active {
            return Ok(LoginOutcome::rejected("Account is not active"));
        }

        // Password was correct: failed-attempt state resets here even if a
        // second factor still stands between the caller and a token.
        if self.lockout.record_success(&mut account) {
            self.store.save(&account).await?;
        }

        match account.second_factor.clone() {
            SecondFactor::Disabled | SecondFactor::PendingTotp { .. } => {
                let token = self.issue_token(&account, false)?;
                tracing::info!(
                    target: "auth.login.succeeded",
                    account_id = account.id,
                    two_factor = false,
                    "Login succeeded"
                );
                Ok(LoginOutcome::authenticated(token, "Login successful"))
            }
            SecondFactor::Totp {
                secret,
                backup_codes,
                ..
            } => match supplied_code(&req) {
                None => Ok(LoginOutcome::pending(
                    "Two-factor authentication required (authenticator app)",
                )),
                Some(code) => {
                    self.verify_totp_factor(account, secret, backup_codes, &code)
                        .await
                }
            },
            SecondFactor::EmailOtp {
                challenge,
                verified_at,
            } => match supplied_code(&req) {
                None => self.issue_email_challenge(account, verified_at).await,
                Some(code) => {
                    self.verify_email_challenge(account, challenge, &code)
                        .await
                }
            },
        }
    }

    /// Redeem an emailed unlock code for a locked account.
    pub async fn unlock_account(&self, email: &str, code: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        let mut account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| PortcullisError::not_found("account"))?;

        let unlocked = self.lockout.unlock(&mut account, code)?;
        if unlocked {
            self.store.save(&account).await?;
        }
        Ok(unlocked)
    }

    async fn verify_totp_factor(
        &self,
        mut account: Account,
        secret: String,
        backup_codes: String,
        code: &str,
    ) -> Result<LoginOutcome> {
        let now = self.clock.now();

        if self.totp.verify(&secret, code, &account.email)? {
            account.second_factor = SecondFactor::Totp {
                secret,
                backup_codes,
                verified_at: Some(now),
            };
            self.store.save(&account).await?;
            return self.complete_second_factor(&account, "Login successful with two-factor authentication");
        }

        if let Some(remaining) = self.totp.consume_backup_code(&backup_codes, code) {
            tracing::info!(
                target: "auth.login.backup_code_used",
                account_id = account.id,
                remaining = remaining.split(',').filter(|s| !s.is_empty()).count(),
                "Backup code consumed during login"
            );
            account.second_factor = SecondFactor::Totp {
                secret,
                backup_codes: remaining,
                verified_at: Some(now),
            };
            self.store.save(&account).await?;
            return self.complete_second_factor(&account, "Login successful with two-factor authentication");
        }

        Ok(LoginOutcome::rejected("Invalid two-factor code"))
    }

    async fn issue_email_challenge(
        &self,
        mut account: Account,
        verified_at: Option<SystemTime>,
    ) -> Result<LoginOutcome> {
        let now = self.clock.now();
        let code = self.codes.numeric();

        account.second_factor = SecondFactor::EmailOtp {
            challenge: Some(StoredCode::issue(&code, now + self.config.email_code_ttl)),
            verified_at,
        };
        self.store.save(&account).await?;

        let subject = format!("Your {} login code", self.config.app_name);
        let body = format!(
            "Hi,\n\n\
             Use this verification code to finish signing in: {code}\n\n\
             This code expires in {} minutes. If you didn't try to sign in, \
             you can ignore this email.\n\n\
             — {}",
            self.config.email_code_ttl.as_secs() / 60,
            self.config.app_name,
        );
        self.send_mail(&account, subject, body).await;

        Ok(LoginOutcome::pending(
            "We sent a 6-digit code to your email. Enter it to continue.",
        ))
    }

    async fn verify_email_challenge(
        &self,
        mut account: Account,
        challenge: Option<StoredCode>,
        code: &str,
    ) -> Result<LoginOutcome> {
        let Some(stored) = challenge else {
            return Ok(LoginOutcome::rejected(
                "No active verification code. Please request a new login code.",
            ));
        };

        if stored.expired(self.clock.now()) {
            return Ok(LoginOutcome::rejected(
                "Verification code expired. Please request a new login code.",
            ));
        }

        if !stored.matches(code.trim()) {
            // The stored code stays usable until it expires.
            return Ok(LoginOutcome::rejected("Invalid verification code."));
        }

        account.second_factor = SecondFactor::EmailOtp {
            challenge: None,
            verified_at: Some(self.clock.now()),
        };
        self.store.save(&account).await?;
        self.complete_second_factor(&account, "Login successful with email verification")
    }

    fn complete_second_factor(
        &self,
        account: &Account,
        message: &str,
    ) -> Result<LoginOutcome> {
        let token = self.issue_token(account, true)?;
        tracing::info!(
            target: "auth.login.succeeded",
            account_id = account.id,
            two_factor = true,
            "Login succeeded"
        );
        Ok(LoginOutcome::authenticated(token, message))
    }

    fn issue_token(&self, account: &Account, two_factor_verified: bool) -> Result<String> {
        self.tokens
            .issue(account.id, &account.email, account.role, two_factor_verified)
    }

    async fn send_mail(&self, account: &Account, subject: String, body: String) {
        if let Err(e) = self
            .mailer
            .send(&Email::new(account.email.as_str(), subject, body))
            .await
        {
            tracing::warn!(
                target: "auth.login.mail_failed",
                account_id = account.id,
                error = %e,
                "Failed to send login email"
            );
        }
    }
}

fn supplied_code(req: &LoginRequest) -> Option<String> {
    req.second_factor_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
