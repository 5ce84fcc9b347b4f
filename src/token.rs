//! Session token issuance and validation.
//!
//! Tokens are HS256 JWTs carrying identity, role, and whether the login that
//! produced them passed a second factor. The signing key is process-wide
//! configuration loaded once at startup; rotating it invalidates every
//! previously issued token, which is accepted behavior.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::account::{AccountId, Role};
use crate::error::{PortcullisError, Result};

/// Configuration for token issuance.
#[derive(Clone)]
pub struct TokenConfig {
    secret: Vec<u8>,
    /// Token issuer (iss claim).
    pub issuer: String,
    /// Token lifetime (default: 24 hours).
    pub ttl: Duration,
}

impl TokenConfig {
    /// Create config with an HS256 symmetric key and issuer name.
    pub fn with_secret(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
            issuer: issuer.into(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Set the token lifetime.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account's email.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: u64,
    /// Expiration time (unix timestamp).
    pub exp: u64,
    pub user_id: AccountId,
    pub email: String,
    pub role: Role,
    /// Whether this login passed a second factor.
    pub two_factor_verified: bool,
}

/// Issues and validates signed session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    /// Create a new issuer; keys are derived once here.
    #[must_use]
    pub fn new(config: TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(&config.secret),
            decoding_key: DecodingKey::from_secret(&config.secret),
            issuer: config.issuer,
            ttl: config.ttl,
            validation,
        }
    }

    /// Issue a signed token for an authenticated account.
    pub fn issue(
        &self,
        account_id: AccountId,
        email: &str,
        role: Role,
        two_factor_verified: bool,
    ) -> Result<String> {
        let now = current_timestamp();
        let claims = Claims {
            sub: email.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl.as_secs(),
            user_id: account_id,
            email: email.to_string(),
            role,
            two_factor_verified,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| PortcullisError::internal(format!("Failed to encode token: {e}")))
    }

    /// Validate signature, expiry, and issuer; returns the claims.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| PortcullisError::unauthorized("invalid or expired token"))
    }

    /// The configured issuer string.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig::with_secret("test-secret-key", "test-app"))
    }

    #[test]
    fn test_issue_and_validate() {
        let issuer = issuer();
        let token = issuer
            .issue(42, "user@example.com", Role::Admin, true)
            .unwrap();

        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "user@example.com");
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.two_factor_verified);
        assert_eq!(claims.iss, "test-app");
        assert_eq!(claims.exp, claims.iat + 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = issuer()
            .issue(1, "user@example.com", Role::User, false)
            .unwrap();

        let other = TokenIssuer::new(TokenConfig::with_secret("different-key", "test-app"));
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = issuer()
            .issue(1, "user@example.com", Role::User, false)
            .unwrap();

        let other = TokenIssuer::new(TokenConfig::with_secret("test-secret-key", "other-app"));
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let short = TokenIssuer::new(
            TokenConfig::with_secret("test-secret-key", "test-app").ttl(Duration::ZERO),
        );
        let token = short.issue(1, "user@example.com", Role::User, false).unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        assert!(short.validate(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(issuer().validate("not-a-token").is_err());
    }
}
