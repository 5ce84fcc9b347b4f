//! Storage traits for accounts.
//!
//! These traits define the interface the flows need from the user directory.
//! Implement them for your database layer; [`InMemoryAccountStore`] is a
//! complete reference implementation used by the tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::account::{Account, AccountId};
use crate::error::Result;

/// Account lookup and persistence required by the flows.
///
/// # Example
///
/// ```rust,ignore
/// use portcullis::store::AccountStore;
/// use async_trait::async_trait;
///
/// struct MyAccountStore {
///     db: DatabaseConnection,
/// }
///
/// #[async_trait]
/// impl AccountStore for MyAccountStore {
///     async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
///         // Query your database
///         Ok(self.db.find_account_by_email(email).await?)
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find an account by email address (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Find an account by its unique ID.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>>;

    /// Persist the account's current state.
    async fn save(&self, account: &Account) -> Result<()>;
}

/// Account creation, used by registration.
#[async_trait]
pub trait AccountCreator: Send + Sync {
    /// Check if an email address is already registered (case-insensitive).
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Create a new account, assigning its ID.
    async fn create(&self, account: Account) -> Result<Account>;
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    next_id: AccountId,
}

/// In-memory account store.
///
/// Reference implementation of [`AccountStore`] and [`AccountCreator`];
/// suitable for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().accounts.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl AccountCreator for InMemoryAccountStore {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(email.trim())))
    }

    async fn create(&self, mut account: Account) -> Result<Account> {
        let mut inner = self.inner.write().unwrap();
        inner.next_id += 1;
        account.id = inner.next_id;
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }
}
