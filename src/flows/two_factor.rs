//! Two-factor setup and teardown.
//!
//! Provisioning stores the secret and backup codes but leaves the factor
//! unenforced until the user confirms with a working code. Disabling requires
//! password re-verification; regenerating backup codes requires a current
//! TOTP code.

use std::sync::Arc;

use crate::account::{AccountId, AccountStatus, SecondFactor};
use crate::clock::Clock;
use crate::error::{PortcullisError, Result};
use crate::password::PasswordHasher;
use crate::store::AccountStore;
use crate::totp::TotpEngine;

use super::types::TwoFactorSetup;

/// Manages the authenticator-app second factor on an account.
pub struct TwoFactorFlow<S: AccountStore> {
    store: S,
    totp: TotpEngine,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl<S: AccountStore> TwoFactorFlow<S> {
    /// Create a new two-factor management flow.
    pub fn new(store: S, totp: TotpEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            totp,
            hasher: PasswordHasher::new(),
            clock,
        }
    }

    /// Provision a new secret and backup codes for an account.
    ///
    /// Valid only for active accounts without an enabled second factor. The
    /// factor stays unenforced until [`confirm`] succeeds. The returned
    /// payload is the only time the secret and raw backup codes are shown.
    ///
    /// [`confirm`]: Self::confirm
    pub async fn setup(&self, account_id: AccountId) -> Result<TwoFactorSetup> {
        let mut account = self.find(account_id).await?;

        if account.status != AccountStatus::Active {
            return Err(PortcullisError::precondition_failed(
                "account not active; verify your email first",
            ));
        }
        if account.second_factor.is_enabled() {
            return Err(PortcullisError::conflict(
                "two-factor authentication is already enabled",
            ));
        }

        let setup = self.totp.generate_setup(&account.email)?;
        let backup_codes = self.totp.generate_backup_codes();

        account.second_factor = SecondFactor::PendingTotp {
            secret: setup.secret.clone(),
            backup_codes: self.totp.seal_backup_codes(&backup_codes),
        };
        self.store.save(&account).await?;

        tracing::info!(
            target: "auth.two_factor.setup_started",
            account_id = account.id,
            "Two-factor setup provisioned, awaiting confirmation"
        );

        Ok(TwoFactorSetup {
            manual_entry_key: self.totp.manual_entry_key(&setup.secret),
            secret: setup.secret,
            qr_code: setup.qr_code,
            issuer: self.totp.issuer().to_string(),
            account_email: account.email,
            backup_codes,
        })
    }

    /// Confirm a pending setup with a code from the authenticator app.
    ///
    /// On success the factor is enabled and enforced at login. Returns
    /// `Ok(false)` on a wrong code without enabling anything.
    pub async fn confirm(&self, account_id: AccountId, code: &str) -> Result<bool> {
        let mut account = self.find(account_id).await?;

        let (secret, backup_codes) = match account.second_factor.clone() {
            SecondFactor::PendingTotp {
                secret,
                backup_codes,
            }
            | SecondFactor::Totp {
                secret,
                backup_codes,
                ..
            } => (secret, backup_codes),
            _ => {
                return Err(PortcullisError::precondition_failed(
                    "two-factor setup not initiated",
                ))
            }
        };

        if !self.totp.verify(&secret, code, &account.email)? {
            return Ok(false);
        }

        account.second_factor = SecondFactor::Totp {
            secret,
            backup_codes,
            verified_at: Some(self.clock.now()),
        };
        self.store.save(&account).await?;

        tracing::info!(
            target: "auth.two_factor.enabled",
            account_id = account.id,
            "Two-factor authentication enabled"
        );
        Ok(true)
    }

    /// Disable the second factor; requires the account password.
    ///
    /// Clears the secret, backup codes, and verified timestamp.
    pub async fn disable(&self, account_id: AccountId, password: &str) -> Result<bool> {
        let mut account = self.find(account_id).await?;

        if !self.hasher.verify(password, &account.password_hash) {
            return Err(PortcullisError::unauthorized("invalid password"));
        }

        account.second_factor = SecondFactor::Disabled;
        self.store.save(&account).await?;

        tracing::warn!(
            target: "auth.two_factor.disabled",
            account_id = account.id,
            "Two-factor authentication disabled"
        );
        Ok(true)
    }

    /// Replace the backup-code set; requires a current TOTP code.
    ///
    /// The previous codes are invalidated wholesale. Returns the new raw
    /// codes for one-time display.
    pub async fn regenerate_backup_codes(
        &self,
        account_id: AccountId,
        code: &str,
    ) -> Result<Vec<String>> {
        let mut account = self.find(account_id).await?;

        let SecondFactor::Totp {
            secret,
            verified_at,
            ..
        } = account.second_factor.clone()
        else {
            return Err(PortcullisError::precondition_failed(
                "two-factor authentication is not enabled",
            ));
        };

        if !self.totp.verify(&secret, code, &account.email)? {
            return Err(PortcullisError::unauthorized("invalid verification code"));
        }

        let backup_codes = self.totp.generate_backup_codes();
        account.second_factor = SecondFactor::Totp {
            secret,
            backup_codes: self.totp.seal_backup_codes(&backup_codes),
            verified_at,
        };
        self.store.save(&account).await?;

        tracing::info!(
            target: "auth.two_factor.backup_codes_rotated",
            account_id = account.id,
            "Backup codes regenerated"
        );
        Ok(backup_codes)
    }

    async fn find(&self, account_id: AccountId) -> Result<crate::account::Account> {
        self.store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| PortcullisError::not_found("account"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, Role};
    use crate::store::{AccountCreator, InMemoryAccountStore};
    use crate::testing::ManualClock;
    use crate::totp::TotpConfig;
    use std::time::SystemTime;

    struct Fixture {
        flow: TwoFactorFlow<InMemoryAccountStore>,
        store: InMemoryAccountStore,
    }

    fn fixture() -> Fixture {
        let store = InMemoryAccountStore::new();
        let flow = TwoFactorFlow::new(
            store.clone(),
            TotpEngine::new(TotpConfig::new("TestApp")),
            Arc::new(ManualClock::starting_now()),
        );
        Fixture { flow, store }
    }

    async fn active_account(store: &InMemoryAccountStore) -> Account {
        let hasher = PasswordHasher::new();
        let mut account = Account::new(
            "user@example.com",
            hasher.hash("Password1"),
            Role::User,
            SystemTime::now(),
        );
        account.status = AccountStatus::Active;
        account.email_verified = true;
        store.create(account).await.unwrap()
    }

    #[tokio::test]
    async fn test_setup_requires_active_account() {
        let fx = fixture();
        let account = Account::new("p@example.com", "h", Role::User, SystemTime::now());
        let account = fx.store.create(account).await.unwrap();

        let err = fx.flow.setup(account.id).await.unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_setup_and_confirm_enables() {
        let fx = fixture();
        let account = active_account(&fx.store).await;

        let setup = fx.flow.setup(account.id).await.unwrap();
        assert_eq!(setup.backup_codes.len(), 10);
        assert!(setup.qr_code.starts_with("data:image/png;base64,"));
        assert!(setup.manual_entry_key.contains(' '));

        // Unconfirmed setup is not enforced.
        let stored = fx.store.find_by_id(account.id).await.unwrap().unwrap();
        assert!(!stored.second_factor.is_enabled());

        // Wrong code does not enable.
        assert!(!fx.flow.confirm(account.id, "000000").await.unwrap());
        let stored = fx.store.find_by_id(account.id).await.unwrap().unwrap();
        assert!(!stored.second_factor.is_enabled());

        // Correct code enables.
        let code = fx
            .flow
            .totp
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        assert!(fx.flow.confirm(account.id, &code).await.unwrap());
        let stored = fx.store.find_by_id(account.id).await.unwrap().unwrap();
        assert!(stored.second_factor.is_enabled());
    }

    #[tokio::test]
    async fn test_setup_twice_conflicts_once_enabled() {
        let fx = fixture();
        let account = active_account(&fx.store).await;

        let setup = fx.flow.setup(account.id).await.unwrap();
        // Re-setup while unconfirmed re-issues.
        let second = fx.flow.setup(account.id).await.unwrap();
        assert_ne!(setup.secret, second.secret);

        let code = fx
            .flow
            .totp
            .generate_current(&second.secret, "user@example.com")
            .unwrap();
        fx.flow.confirm(account.id, &code).await.unwrap();

        let err = fx.flow.setup(account.id).await.unwrap_err();
        assert!(matches!(err, PortcullisError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_confirm_without_setup_fails() {
        let fx = fixture();
        let account = active_account(&fx.store).await;

        let err = fx.flow.confirm(account.id, "123456").await.unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_disable_requires_password() {
        let fx = fixture();
        let account = active_account(&fx.store).await;
        let setup = fx.flow.setup(account.id).await.unwrap();
        let code = fx
            .flow
            .totp
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        fx.flow.confirm(account.id, &code).await.unwrap();

        let err = fx.flow.disable(account.id, "wrong").await.unwrap_err();
        assert!(matches!(err, PortcullisError::Unauthorized(_)));

        assert!(fx.flow.disable(account.id, "Password1").await.unwrap());
        let stored = fx.store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.second_factor, SecondFactor::Disabled);
    }

    #[tokio::test]
    async fn test_regenerate_replaces_old_codes() {
        let fx = fixture();
        let account = active_account(&fx.store).await;
        let setup = fx.flow.setup(account.id).await.unwrap();
        let code = fx
            .flow
            .totp
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        fx.flow.confirm(account.id, &code).await.unwrap();

        let err = fx
            .flow
            .regenerate_backup_codes(account.id, "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, PortcullisError::Unauthorized(_)));

        let code = fx
            .flow
            .totp
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        let new_codes = fx
            .flow
            .regenerate_backup_codes(account.id, &code)
            .await
            .unwrap();
        assert_eq!(new_codes.len(), 10);

        // Old codes no longer match the stored blob.
        let stored = fx.store.find_by_id(account.id).await.unwrap().unwrap();
        let SecondFactor::Totp { backup_codes, .. } = stored.second_factor else {
            panic!("expected totp factor");
        };
        for old in &setup.backup_codes {
            assert!(fx.flow.totp.consume_backup_code(&backup_codes, old).is_none());
        }
        assert!(fx
            .flow
            .totp
            .consume_backup_code(&backup_codes, &new_codes[0])
            .is_some());
    }

    #[tokio::test]
    async fn test_regenerate_requires_enabled_factor() {
        let fx = fixture();
        let account = active_account(&fx.store).await;

        let err = fx
            .flow
            .regenerate_backup_codes(account.id, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, PortcullisError::PreconditionFailed(_)));
    }
}
