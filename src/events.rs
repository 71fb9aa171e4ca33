//! Domain events and delivery capabilities.
//!
//! The decision core never performs notification I/O inline; it emits
//! events for a notifier collaborator and hands password-reset mail to the
//! [`Mailer`] capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Security-relevant happenings a notifier may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Failed attempts are approaching the lockout threshold.
    FailedLoginSpike {
        email: String,
        attempts: u32,
        ip_address: String,
    },
    AccountLocked {
        email: String,
        attempts: u32,
        ip_address: String,
    },
    /// Repeated failures worth telling the account holder about.
    SuspiciousLogin {
        email: String,
        ip_address: String,
        user_agent: Option<String>,
        at: DateTime<Utc>,
    },
    TwoFactorEnabled { email: String },
    TwoFactorDisabled { email: String },
    PasswordResetRequested { email: String },
    PasswordResetCompleted { email: String },
}

/// Consumer of domain events. Delivery (email, paging, error trackers) is
/// entirely the implementation's concern; emission must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: AuthEvent) {}
}

/// Outbound email capability. Returns whether the message was accepted for
/// delivery; the core treats `false` as a logged non-fatal condition.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Accepts and drops all mail. Useful where delivery is handled elsewhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> bool {
        true
    }
}
