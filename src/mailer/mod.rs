//! Outbound email.
//!
//! The flows treat mail as best-effort: a failed send is logged and swallowed,
//! never allowed to roll back a security-state change. Two backends are
//! provided: [`ConsoleMailer`] for development and [`SmtpMailer`] for real
//! delivery.

mod console;
mod smtp;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

use async_trait::async_trait;

use crate::error::{PortcullisError, Result};

/// An email message to be sent.
#[derive(Debug, Clone)]
pub struct Email {
    /// Sender address; backends may fall back to a configured default.
    pub from: Option<String>,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Email {
    /// Create a new email.
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: None,
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Set an explicit sender address.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Validate the email has the required fields.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(PortcullisError::precondition_failed("email 'to' is required"));
        }
        if self.subject.is_empty() {
            return Err(PortcullisError::precondition_failed(
                "email 'subject' is required",
            ));
        }
        if self.body.is_empty() {
            return Err(PortcullisError::precondition_failed("email 'body' is required"));
        }
        Ok(())
    }
}

/// Mailer trait for sending emails.
///
/// Implement this to plug in a custom delivery backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &Email) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_builder() {
        let email = Email::new("to@example.com", "Subject", "Body").from("noreply@example.com");
        assert_eq!(email.to, "to@example.com");
        assert_eq!(email.from.as_deref(), Some("noreply@example.com"));
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_fields() {
        assert!(Email::new("", "s", "b").validate().is_err());
        assert!(Email::new("to@example.com", "", "b").validate().is_err());
        assert!(Email::new("to@example.com", "s", "").validate().is_err());
    }
}
