//! One-time code generation and digest storage.
//!
//! Every code-based flow (email verification, password reset, account unlock,
//! email login codes, backup codes) draws its secrets from here. Raw codes are
//! only ever held long enough to be mailed; storage always gets the digest.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Backup codes use the full uppercase alphanumeric range.
const BACKUP_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a backup code, excluding the display dash.
const BACKUP_CODE_LENGTH: usize = 8;

/// Generates one-time codes from the OS random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    /// Create a new code generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generate a fixed-width 6-digit numeric code.
    ///
    /// Used for verification, reset, unlock, and email login codes.
    pub fn numeric(&self) -> String {
        let mut rng = rand::rngs::OsRng;
        rng.gen_range(100_000..=999_999u32).to_string()
    }

    /// Generate an 8-character alphanumeric backup code, displayed `XXXX-XXXX`.
    pub fn backup(&self) -> String {
        let mut rng = rand::rngs::OsRng;
        let code: String = (0..BACKUP_CODE_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..BACKUP_CHARSET.len());
                BACKUP_CHARSET[idx] as char
            })
            .collect();
        format!("{}-{}", &code[..4], &code[4..])
    }
}

/// Digest a code for storage.
///
/// Deterministic, so verification is a digest comparison and raw codes never
/// persist.
pub fn digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Check a candidate code against a stored digest in constant time.
pub fn matches(candidate: &str, stored_digest: &str) -> bool {
    constant_time_compare(&digest(candidate), stored_digest)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
