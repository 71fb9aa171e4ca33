//! # Gardisto (Administrative Authentication Gateway)
//!
//! `gardisto` is the credential-authentication and session-lifecycle engine
//! behind an administrative dashboard. It owns every security decision:
//! password verification with progressive lockout, an optional TOTP second
//! factor with single-use backup codes, signed access/refresh token issuance
//! and rotation, tiered rate limiting, device-session tracking, and an
//! append-only audit trail.
//!
//! ## Boundaries
//!
//! The crate is transport- and storage-agnostic. Durable state (accounts,
//! refresh tokens, sessions, audit entries, rate-limit counters) is reached
//! through the traits in [`store`]; email delivery is a [`events::Mailer`]
//! capability; QR rendering, cookies, and HTTP routing belong to the caller.
//! In-memory implementations of every store ship in [`store::memory`] and
//! back both the test suite and the rate limiter's fail-open fallback.
//!
//! ## Security posture
//!
//! - Unknown-email and wrong-password failures are indistinguishable to the
//!   caller, preventing account enumeration.
//! - Backup codes, session tokens, and password-reset tokens are stored
//!   hashed; raw values exist only in the response that first returns them.
//! - A refresh token never validates as an access token, nor the reverse.
//! - Every security-relevant outcome is written to the audit log before the
//!   decision is returned; audit failures are logged but never override a
//!   decision already made.

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod lockout;
pub mod model;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod store;
pub mod token;
pub mod twofactor;
pub(crate) mod util;

pub use config::{AuthConfig, ConfigError, Environment};
pub use error::AuthError;
pub use service::{AuthService, LoginOutcome, RequestContext};
