//! Registration flow.
//!
//! Creates the account in `PendingVerification` and immediately issues the
//! email-ownership code.

use std::sync::Arc;

use crate::account::{Account, Role};
use crate::clock::Clock;
use crate::error::{PortcullisError, Result};
use crate::password::PasswordHasher;
use crate::store::{AccountCreator, AccountStore};

use super::types::RegisterRequest;
use super::verify::EmailVerificationFlow;

/// Handles account registration.
pub struct RegistrationFlow<S>
where
    S: AccountStore + AccountCreator,
{
    store: S,
    hasher: PasswordHasher,
    verification: EmailVerificationFlow<S>,
    clock: Arc<dyn Clock>,
}

impl<S> RegistrationFlow<S>
where
    S: AccountStore + AccountCreator,
{
    /// Create a new registration flow around an existing verification flow.
    pub fn new(store: S, verification: EmailVerificationFlow<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
            verification,
            clock,
        }
    }

    /// Register a new account.
    ///
    /// The account starts in `PendingVerification` with `Role::User`;
    /// privileged roles are assigned out-of-band. A verification code is
    /// issued immediately; mail failure is logged and does not fail the
    /// registration.
    pub async fn register(&self, req: RegisterRequest) -> Result<Account> {
        let email = req.email.trim().to_lowercase();

        if !is_valid_email(&email) {
            return Err(PortcullisError::precondition_failed("invalid email format"));
        }

        if self.store.email_exists(&email).await? {
            return Err(PortcullisError::conflict("email already registered"));
        }

        let hash = self.hasher.hash(&req.password);
        let account = Account::new(email, hash, Role::User, self.clock.now());
        let mut account = self.store.create(account).await?;

        if let Err(e) = self.verification.issue(&mut account).await {
            tracing::warn!(
                target: "auth.register.verification_failed",
                account_id = account.id,
                error = %e,
                "Failed to issue verification code after registration"
            );
        }

        tracing::info!(
            target: "auth.register.created",
            account_id = account.id,
            "Account registered, pending verification"
        );
        Ok(account)
    }
}

/// Basic email shape validation.
fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
