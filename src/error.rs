//! Error taxonomy for authentication outcomes.
//!
//! Invalid-credentials-class messages are intentionally uninformative so
//! unknown-email and wrong-password are indistinguishable to the caller.
//! Lockout and rate-limit errors carry timing detail; the account's
//! existence is already implied by the caller's own action.

use chrono::{DateTime, Utc};

use crate::rate_limit::LimitScope;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Transient; retry after `reset_at`.
    #[error("Too many requests. Please try again later.")]
    RateLimited {
        scope: LimitScope,
        reset_at: DateTime<Utc>,
    },

    /// Terminal for this attempt. Identical surface for unknown email and
    /// wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Terminal; requires operator action.
    #[error("Account is inactive")]
    AccountInactive,

    /// Transient; retry after the lock expires.
    #[error("Account is locked. Please try again in {remaining_minutes} minutes.")]
    AccountLocked { remaining_minutes: i64 },

    /// Malformed, expired, wrong-kind, or revoked token. Always terminal;
    /// the caller must re-authenticate.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Wrong TOTP code or backup code. Terminal for this attempt; does not
    /// count toward the password lockout counter.
    #[error("Invalid two-factor code")]
    InvalidSecondFactor,

    /// The operation requires a configured second factor that is absent.
    #[error("Two-factor authentication is not configured")]
    TwoFactorNotConfigured,

    #[error("{0}")]
    Validation(&'static str),

    /// Infrastructure fault. Never conflated with "not found". The cause
    /// chain is carried for logs; the display surface stays generic.
    #[error("Authentication service unavailable")]
    Storage(anyhow::Error),
}

impl AuthError {
    /// Wrap a store failure, preserving the cause chain.
    #[must_use]
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
