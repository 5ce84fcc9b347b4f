//! Test doubles for the crate's collaborators.
//!
//! [`RecordingMailer`] captures outbound mail so tests can read issued codes
//! back out of the bodies; [`ManualClock`] lets tests cross expiry windows by
//! advancing time instead of sleeping.

use async_trait::async_trait;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};

use crate::clock::Clock;
use crate::error::Result;
use crate::mailer::{Email, Mailer};

/// A mailer that records every email instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: RwLock<Vec<Email>>,
}

impl RecordingMailer {
    /// Create an empty recording mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured emails, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().unwrap().clone()
    }

    /// The most recently captured email.
    #[must_use]
    pub fn last(&self) -> Option<Email> {
        self.sent.read().unwrap().last().cloned()
    }

    /// Pull the first 6-digit code out of the nth captured email's body.
    #[must_use]
    pub fn extract_numeric_code(&self, index: usize) -> Option<String> {
        let sent = self.sent.read().unwrap();
        extract_numeric_code(&sent.get(index)?.body)
    }

    /// Pull the first 6-digit code out of the most recent email's body.
    #[must_use]
    pub fn extract_last_numeric_code(&self) -> Option<String> {
        extract_numeric_code(&self.last()?.body)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }
}

/// Find the first run of exactly 6 consecutive digits in a mail body.
fn extract_numeric_code(body: &str) -> Option<String> {
    let bytes = body.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            if i - s == 6 {
                return Some(body[s..i].to_string());
            }
        }
    }
    start.and_then(|s| (bytes.len() - s == 6).then(|| body[s..].to_string()))
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Create a clock pinned to the given instant.
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock pinned to the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(SystemTime::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    /// Pin the clock to a specific instant.
    pub fn set(&self, to: SystemTime) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}
