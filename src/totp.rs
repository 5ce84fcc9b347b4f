//! TOTP (RFC 6238) second factor and backup recovery codes.

use totp_rs::{Algorithm, Secret, TOTP};

use crate::code::{self, CodeGenerator};
use crate::error::{PortcullisError, Result};

/// Number of backup codes issued per set.
const BACKUP_CODES_COUNT: usize = 10;

/// Configuration for TOTP generation.
#[derive(Clone)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Algorithm (default: SHA1 for authenticator-app compatibility).
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "App".to_string(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    /// Create a new TOTP config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Set the number of digits.
    #[must_use]
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Set the time step in seconds.
    #[must_use]
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }
}

/// Data produced when provisioning TOTP for an account.
///
/// Shown to the user exactly once; never logged.
pub struct TotpSetup {
    /// Base32-encoded secret to store on the account.
    pub secret: String,
    /// otpauth:// URI embedding issuer, account label, and secret.
    pub uri: String,
    /// Scannable QR code as a `data:image/png;base64,` URL.
    pub qr_code: String,
}

/// TOTP operations: provisioning, verification, and backup codes.
#[derive(Clone)]
pub struct TotpEngine {
    config: TotpConfig,
    codes: CodeGenerator,
}

impl TotpEngine {
    /// Create a new engine with the given configuration.
    #[must_use]
    pub fn new(config: TotpConfig) -> Self {
        Self {
            config,
            codes: CodeGenerator::new(),
        }
    }

    /// The configured issuer name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// Generate a fresh secret plus the renderable provisioning payload.
    pub fn generate_setup(&self, account_email: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_email)?;
        let uri = totp.get_url();

        let qr_png = totp.get_qr_base64().map_err(|e| {
            PortcullisError::internal(format!("Failed to generate QR code: {e}"))
        })?;

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
            qr_code: format!("data:image/png;base64,{qr_png}"),
        })
    }

    /// Secret split into 4-character groups for manual typing.
    #[must_use]
    pub fn manual_entry_key(&self, secret: &str) -> String {
        secret
            .as_bytes()
            .chunks(4)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Verify a code against a stored secret for the current time step.
    ///
    /// Tolerates ±1 step of clock skew. Malformed input (wrong width,
    /// non-numeric) is invalid, not an error.
    pub fn verify(&self, secret: &str, candidate: &str, account_label: &str) -> Result<bool> {
        let candidate = candidate.replace([' ', '-'], "");
        if candidate.len() != self.config.digits
            || !candidate.chars().all(|c| c.is_ascii_digit())
        {
            return Ok(false);
        }

        let totp = self.build_totp(secret, account_label)?;
        match totp.check_current(&candidate) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                tracing::warn!(error = %e, "TOTP verification error (system time issue?)");
                Ok(false)
            }
        }
    }

    /// Verify against a specific timestamp.
    pub fn verify_at(
        &self,
        secret: &str,
        candidate: &str,
        account_label: &str,
        time: u64,
    ) -> Result<bool> {
        let candidate = candidate.replace([' ', '-'], "");
        let totp = self.build_totp(secret, account_label)?;
        Ok(totp.check(&candidate, time))
    }

    /// Generate the code for the current step — the counterpart of [`verify`],
    /// used by tests and enrollment previews.
    ///
    /// [`verify`]: Self::verify
    pub fn generate_current(&self, secret: &str, account_label: &str) -> Result<String> {
        let totp = self.build_totp(secret, account_label)?;
        totp.generate_current()
            .map_err(|e| PortcullisError::internal(format!("Failed to generate TOTP: {e}")))
    }

    /// Generate a fresh set of raw backup codes for one-time display.
    #[must_use]
    pub fn generate_backup_codes(&self) -> Vec<String> {
        (0..BACKUP_CODES_COUNT).map(|_| self.codes.backup()).collect()
    }

    /// Digest raw backup codes into the comma-joined storage blob.
    #[must_use]
    pub fn seal_backup_codes(&self, raw_codes: &[String]) -> String {
        raw_codes
            .iter()
            .map(|c| code::digest(&canonical(c)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Consume a backup code from the storage blob.
    ///
    /// Returns the blob with exactly the matched code removed, or `None` if
    /// the candidate matches nothing. A second attempt with the same code
    /// therefore fails.
    #[must_use]
    pub fn consume_backup_code(&self, stored_blob: &str, candidate: &str) -> Option<String> {
        if stored_blob.is_empty() {
            return None;
        }

        let candidate = canonical(candidate);
        let mut remaining: Vec<&str> = Vec::new();
        let mut found = false;

        for digest in stored_blob.split(',') {
            if !found && code::matches(&candidate, digest.trim()) {
                found = true;
            } else {
                remaining.push(digest.trim());
            }
        }

        found.then(|| remaining.join(","))
    }

    fn build_totp(&self, secret: &str, account_label: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            1, // 1 step skew tolerance
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| PortcullisError::internal(format!("Invalid TOTP secret: {e}")))?,
            Some(self.config.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| PortcullisError::internal(format!("Failed to create TOTP: {e}")))
    }
}

/// Normalize a backup code for digesting: strip separators, uppercase.
fn canonical(code: &str) -> String {
    code.replace(['-', ' '], "").to_uppercase()
}
