//! Request and outcome types for the authentication flows.

use serde::{Deserialize, Serialize};

/// Login request from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Optional second-factor code (TOTP, backup code, or emailed code).
    pub second_factor_code: Option<String>,
}

impl LoginRequest {
    /// Create a first-step login request (no second-factor code yet).
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            second_factor_code: None,
        }
    }

    /// Attach a second-factor code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.second_factor_code = Some(code.into());
        self
    }
}

/// Outcome of a login attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum LoginOutcome {
    /// Fully authenticated; a session token was issued.
    #[serde(rename = "authenticated")]
    Authenticated {
        /// Signed session token.
        token: String,
        message: String,
    },
    /// Credentials were correct but a second factor is still required; the
    /// client must resubmit email, password, and code together.
    #[serde(rename = "pending")]
    SecondFactorPending { message: String },
    /// The attempt was rejected.
    #[serde(rename = "rejected")]
    Rejected { message: String },
}

impl LoginOutcome {
    pub(crate) fn authenticated(token: String, message: impl Into<String>) -> Self {
        Self::Authenticated {
            token,
            message: message.into(),
        }
    }

    pub(crate) fn pending(message: impl Into<String>) -> Self {
        Self::SecondFactorPending {
            message: message.into(),
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Whether a token was issued.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// The issued token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Authenticated { message, .. }
            | Self::SecondFactorPending { message }
            | Self::Rejected { message } => message,
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Email address to register.
    pub email: String,
    /// Chosen password.
    pub password: String,
}

/// One-time display of a freshly provisioned second factor.
///
/// The backup codes and secret are shown exactly once and are not
/// retrievable afterwards.
#[derive(Debug, Serialize)]
pub struct TwoFactorSetup {
    /// Base32 secret for manual provisioning.
    pub secret: String,
    /// Scannable QR payload (`data:image/png;base64,` URL).
    pub qr_code: String,
    /// Secret split into 4-character groups for manual typing.
    pub manual_entry_key: String,
    /// Issuer name shown in the authenticator app.
    pub issuer: String,
    /// Account label shown in the authenticator app.
    pub account_email: String,
    /// Raw backup codes, one-time display.
    pub backup_codes: Vec<String>,
}
