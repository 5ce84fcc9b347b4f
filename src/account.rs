//! The account aggregate and its security state.
//!
//! All durable state the flows operate on lives here. Persistence is the
//! caller's concern (see [`crate::store`]); this module only models the data
//! and its invariants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::code;

/// Account identifier.
pub type AccountId = i64;

/// Account role, validated at the boundary rather than carried as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::PortcullisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(crate::PortcullisError::precondition_failed(format!(
                "unknown role: {other}"
            ))),
        }
    }
}

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Created but the email has not been verified yet.
    PendingVerification,
    Active,
    Banned,
}

/// A stored one-time code: digest plus expiry, never one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCode {
    /// Digest of the raw code (see [`crate::code::digest`]).
    pub hash: String,
    pub expires_at: SystemTime,
}

impl StoredCode {
    /// Digest and store a freshly issued raw code.
    #[must_use]
    pub fn issue(raw_code: &str, expires_at: SystemTime) -> Self {
        Self {
            hash: code::digest(raw_code),
            expires_at,
        }
    }

    /// Whether the code's window has elapsed.
    #[must_use]
    pub fn expired(&self, now: SystemTime) -> bool {
        self.expires_at < now
    }

    /// Constant-time check of a candidate against the stored digest.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        code::matches(candidate, &self.hash)
    }
}

/// The second-factor mechanism on an account.
///
/// Exactly one mechanism is active at a time; the variants carry the data of
/// their state so an account cannot hold, say, a TOTP secret and an email
/// challenge simultaneously.
#[derive(Clone, PartialEq, Eq)]
pub enum SecondFactor {
    /// Two-factor authentication is off.
    Disabled,
    /// Setup was initiated but not yet confirmed with a code; login is not
    /// gated until confirmation.
    PendingTotp {
        /// Base32 TOTP secret awaiting confirmation.
        secret: String,
        /// Hashed comma-joined backup codes issued alongside the secret.
        backup_codes: String,
    },
    /// Authenticator-app TOTP, confirmed and enforced at login.
    Totp {
        secret: String,
        /// Hashed comma-joined backup codes; shrinks as codes are consumed.
        backup_codes: String,
        verified_at: Option<SystemTime>,
    },
    /// Email one-time codes; `challenge` holds the outstanding code, if any.
    EmailOtp {
        challenge: Option<StoredCode>,
        verified_at: Option<SystemTime>,
    },
}

impl SecondFactor {
    /// Whether a second factor is enforced at login.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Totp { .. } | Self::EmailOtp { .. })
    }
}

// Hand-written so the TOTP secret never lands in logs.
impl fmt::Debug for SecondFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::PendingTotp { .. } => f.write_str("PendingTotp { secret: [redacted], .. }"),
            Self::Totp { verified_at, .. } => f
                .debug_struct("Totp")
                .field("secret", &"[redacted]")
                .field("verified_at", verified_at)
                .finish_non_exhaustive(),
            Self::EmailOtp {
                challenge,
                verified_at,
            } => f
                .debug_struct("EmailOtp")
                .field("challenge", &challenge.is_some())
                .field("verified_at", verified_at)
                .finish(),
        }
    }
}

/// Failed-attempt bookkeeping and lock state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<SystemTime>,
    pub unlock: Option<StoredCode>,
}

impl LockoutState {
    /// Whether any lockout bookkeeping is present.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.failed_attempts == 0 && self.locked_until.is_none() && self.unlock.is_none()
    }
}

/// One user's account with all of its security state.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Stored lowercase; lookups are case-insensitive.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    /// Outstanding email-ownership verification code.
    pub verification: Option<StoredCode>,
    pub second_factor: SecondFactor,
    /// Outstanding password-reset code.
    pub reset: Option<StoredCode>,
    pub lockout: LockoutState,
    pub created_at: SystemTime,
}

impl Account {
    /// A freshly registered account: pending verification, no security state.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
        now: SystemTime,
    ) -> Self {
        Self {
            id: 0,
            email: email.into().trim().to_lowercase(),
            password_hash: password_hash.into(),
            role,
            status: AccountStatus::PendingVerification,
            email_verified: false,
            verification: None,
            second_factor: SecondFactor::Disabled,
            reset: None,
            lockout: LockoutState::default(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_account_shape() {
        let now = SystemTime::now();
        let account = Account::new("  User@Example.COM ", "hash", Role::User, now);
        assert_eq!(account.email, "user@example.com");
        assert_eq!(account.status, AccountStatus::PendingVerification);
        assert!(!account.email_verified);
        assert!(account.verification.is_none());
        assert_eq!(account.second_factor, SecondFactor::Disabled);
        assert!(account.lockout.is_clear());
    }

    #[test]
    fn test_stored_code_round_trip() {
        let now = SystemTime::now();
        let stored = StoredCode::issue("123456", now + Duration::from_secs(60));
        assert!(stored.matches("123456"));
        assert!(!stored.matches("654321"));
        assert!(!stored.expired(now));
        assert!(stored.expired(now + Duration::from_secs(61)));
    }

    #[test]
    fn test_second_factor_enabled() {
        assert!(!SecondFactor::Disabled.is_enabled());
        assert!(!SecondFactor::PendingTotp {
            secret: "S".into(),
            backup_codes: String::new(),
        }
        .is_enabled());
        assert!(SecondFactor::Totp {
            secret: "S".into(),
            backup_codes: String::new(),
            verified_at: None,
        }
        .is_enabled());
        assert!(SecondFactor::EmailOtp {
            challenge: None,
            verified_at: None,
        }
        .is_enabled());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let factor = SecondFactor::Totp {
            secret: "JBSWY3DPEHPK3PXP".into(),
            backup_codes: String::new(),
            verified_at: None,
        };
        let rendered = format!("{factor:?}");
        assert!(!rendered.contains("JBSWY3DPEHPK3PXP"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("SUPER_ADMIN".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("root".parse::<Role>().is_err());
    }
}
