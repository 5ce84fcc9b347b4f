//! Password hashing and verification.
//!
//! The stored format is an unsalted MD5 hex digest, kept for compatibility
//! with the existing user base.
//! TODO: migrate stored hashes to a salted KDF (argon2id) on next login.

use md5::{Digest, Md5};

/// Hashes and verifies passwords against the stored digest format.
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    /// Create a new password hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hash a password into the stored format.
    #[must_use]
    pub fn hash(&self, password: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(password.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Verify a password against a stored hash in constant time.
    #[must_use]
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        use subtle::ConstantTimeEq;
        self.hash(password)
            .as_bytes()
            .ct_eq(stored_hash.as_bytes())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("correct-horse-battery-staple");

        assert!(hasher.verify("correct-horse-battery-staple", &hash));
        assert!(!hasher.verify("wrong-password", &hash));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = PasswordHasher::new();
        assert_eq!(hasher.hash("same-password"), hasher.hash("same-password"));
    }

    #[test]
    fn test_known_digest() {
        // MD5("password") — pins the stored format.
        let hasher = PasswordHasher::new();
        assert_eq!(hasher.hash("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
    }
}
