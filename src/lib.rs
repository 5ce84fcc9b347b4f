//! Portcullis - account security flows for credential-based services
//!
//! Portcullis implements the security core a user-facing service delegates to:
//! credential verification with brute-force lockout, a conditional second
//! factor (authenticator-app TOTP with backup codes, or emailed one-time
//! codes), email-ownership verification at registration, password reset by
//! code, and signed session tokens. Storage, outbound mail, and the clock are
//! pluggable collaborators, so the flows stay transport- and
//! persistence-agnostic.
//!
//! # Features
//!
//! - **Login**: state machine over `rejected` / `pending` / `authenticated`
//!   with enumeration-safe rejection messages
//! - **Second factor**: RFC 6238 TOTP with single-use backup codes, or
//!   emailed 6-digit codes when no authenticator is provisioned
//! - **Lockout**: timed lock after repeated failures, lifted by expiry or an
//!   emailed unlock code
//! - **Recovery**: password reset and email verification code lifecycles,
//!   digests at rest, expiry against an injected clock
//! - **Tokens**: HS256 JWTs carrying identity, role, and the
//!   second-factor-verified flag
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use portcullis::{
//!     AuthenticationFlow, InMemoryAccountStore, LoginFlowConfig, LoginRequest,
//!     SystemClock, TokenConfig, TokenIssuer,
//! };
//! use portcullis::mailer::ConsoleMailer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> portcullis::Result<()> {
//!     let store = InMemoryAccountStore::new();
//!     let flow = AuthenticationFlow::new(
//!         store,
//!         TokenIssuer::new(TokenConfig::with_secret("change-me", "my-app")),
//!         Arc::new(ConsoleMailer::new()),
//!         Arc::new(SystemClock),
//!         LoginFlowConfig::new("my-app"),
//!     );
//!
//!     let outcome = flow
//!         .login(LoginRequest::new("user@example.com", "password"))
//!         .await?;
//!     println!("{}", outcome.message());
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod clock;
pub mod code;
mod error;
pub mod flows;
pub mod lockout;
pub mod mailer;
pub mod password;
pub mod store;
pub mod testing;
pub mod token;
pub mod totp;

// Re-exports for the public API
pub use account::{Account, AccountId, AccountStatus, LockoutState, Role, SecondFactor, StoredCode};
pub use clock::{Clock, SystemClock};
pub use code::CodeGenerator;
pub use error::{PortcullisError, Result};
pub use flows::{
    AuthenticationFlow, EmailVerificationFlow, LoginFlowConfig, LoginOutcome, LoginRequest,
    PasswordResetFlow, RegisterRequest, RegistrationFlow, TwoFactorFlow, TwoFactorSetup,
};
pub use lockout::{Lockout, LockoutPolicy};
pub use mailer::{Email, Mailer};
pub use password::PasswordHasher;
pub use store::{AccountCreator, AccountStore, InMemoryAccountStore};
pub use token::{Claims, TokenConfig, TokenIssuer};
pub use totp::{TotpConfig, TotpEngine, TotpSetup};
