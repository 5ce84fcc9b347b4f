//! Console mailer for development.
//!
//! Prints emails to stdout instead of sending them. Bodies carry one-time
//! codes, so content is redacted by default; enable full output only in a
//! development environment where stdout is not captured by log shipping.

use async_trait::async_trait;

use super::{Email, Mailer};
use crate::error::Result;

/// A mailer that prints emails to stdout instead of sending them.
#[derive(Debug, Clone)]
pub struct ConsoleMailer {
    prefix: String,
    show_full_content: bool,
}

impl ConsoleMailer {
    /// Create a new console mailer with body redaction on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: "[EMAIL]".to_string(),
            show_full_content: false,
        }
    }

    /// Use a custom line prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            show_full_content: false,
        }
    }

    /// Enable or disable full body output.
    ///
    /// Bodies contain verification and unlock codes; leave this off anywhere
    /// stdout is collected.
    #[must_use]
    pub fn with_full_output(mut self, enabled: bool) -> Self {
        if enabled {
            tracing::warn!(
                "ConsoleMailer: full output enabled - email bodies (including one-time codes) \
                 will be visible on stdout"
            );
        }
        self.show_full_content = enabled;
        self
    }
}

impl Default for ConsoleMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;

        println!("{} ════════════════════════════════════════", self.prefix);
        if let Some(ref from) = email.from {
            println!("{} From:    {}", self.prefix, from);
        }
        println!("{} To:      {}", self.prefix, email.to);
        println!("{} Subject: {}", self.prefix, email.subject);
        println!("{} ────────────────────────────────────────", self.prefix);

        if self.show_full_content {
            for line in email.body.lines() {
                println!("{} {}", self.prefix, line);
            }
        } else {
            println!("{} [BODY] {} bytes [REDACTED]", self.prefix, email.body.len());
        }

        println!("{} ════════════════════════════════════════", self.prefix);

        Ok(())
    }
}
