//! Domain records shared across the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An administrative account, the root entity of the auth domain.
///
/// `is_locked == true` implies `locked_until` is set; a lock whose expiry
/// has passed is treated as cleared on the next login attempt.
/// `two_factor_enabled == true` implies `totp_secret` is present; a secret
/// without the flag is a pending enrollment and does not gate login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Stored lowercase; lookups normalize first.
    pub email: String,
    pub name: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    /// Base32-encoded TOTP secret, present while configured or pending.
    pub totp_secret: Option<String>,
    /// Argon2id PHC strings; one entry per unused backup code.
    pub backup_code_hashes: Vec<String>,
    pub failed_login_attempts: u32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    /// SHA-256 of the raw reset token; the raw value is only ever e-mailed.
    pub reset_token_hash: Option<Vec<u8>>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Minimal constructor for a fresh, unlocked account.
    #[must_use]
    pub fn new(email: String, name: String, password_hash: String, roles: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            name,
            password_hash,
            roles,
            is_active: true,
            two_factor_enabled: false,
            totp_secret: None,
            backup_code_hashes: Vec::new(),
            failed_login_attempts: 0,
            is_locked: false,
            locked_until: None,
            last_login_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
        }
    }
}

/// Outcome of an atomic failed-attempt increment on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    pub attempts: u32,
    pub locked: bool,
}

/// Persistent record backing an issued refresh token.
///
/// At most one non-revoked record exists per `jti`; revocation is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub jti: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

/// A device session tracked independently of token internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Opaque random token; the store keeps only its hash.
    pub token_hash: Vec<u8>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    /// Best-effort "Browser on OS" label for display only.
    pub device_label: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl Session {
    /// Active means not revoked and not yet expired.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// Append-only audit record. Never mutated or deleted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Absent for attempts against unknown emails.
    pub account_id: Option<Uuid>,
    pub email: String,
    pub action: String,
    pub reason: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Fixed-window counter state for one identifier+tier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}
