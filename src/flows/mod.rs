//! Account-security flows.
//!
//! High-level operations that combine password verification, one-time codes,
//! the second factor, lockout, and token issuance over a pluggable store.

mod login;
mod register;
mod reset;
mod two_factor;
mod types;
mod verify;

pub use login::{AuthenticationFlow, LoginFlowConfig};
pub use register::RegistrationFlow;
pub use reset::PasswordResetFlow;
pub use two_factor::TwoFactorFlow;
pub use types::*;
pub use verify::EmailVerificationFlow;
