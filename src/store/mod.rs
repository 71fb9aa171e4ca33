//! Collaborator contracts for durable state.
//!
//! The gateway never talks to a database directly; every durable concern
//! enters through one of these traits. Contracts that must hold under
//! concurrent requests are expressed as single operations (conditional
//! increment, consume-if-present, idempotent revoke) so implementations can
//! map them onto one atomic statement.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::model::{
    Account, AuditEntry, FailedAttempt, RateLimitWindow, RefreshTokenRecord, Session,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Look up the account holding a still-valid reset token hash.
    async fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Account>>;

    /// Atomically increment the failed-attempt counter and, when the new
    /// count reaches `threshold`, transition the account into the locked
    /// state with the given expiry. Two racing calls must serialize: at
    /// most one observes the transition into locked.
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<FailedAttempt>;

    /// Clear the counter and any lock.
    async fn reset_lockout(&self, id: Uuid) -> Result<()>;

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Store a pending TOTP secret and the hashed backup codes. Does not
    /// flip the enabled flag.
    async fn set_pending_totp(
        &self,
        id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> Result<()>;

    async fn enable_two_factor(&self, id: Uuid) -> Result<()>;

    /// Clear secret, backup codes, and the enabled flag in one operation.
    async fn disable_two_factor(&self, id: Uuid) -> Result<()>;

    /// Remove one backup-code hash if still present. Returns whether the
    /// removal happened; a concurrent consumer of the same code sees
    /// `false`.
    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Install the new password hash, clear the reset token, and clear the
    /// lockout state in one operation.
    async fn complete_password_reset(&self, id: Uuid, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Monotonic and idempotent: revoking an already-revoked or unknown
    /// token is a no-op, not an error.
    async fn revoke(&self, jti: &str) -> Result<()>;

    /// Revoke every outstanding token for the account. Returns the number
    /// of records newly revoked.
    async fn revoke_all_for(&self, account_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<()>;

    /// Active sessions for the account, most recent activity first.
    async fn list_active(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Session>>;

    /// Revoke one session, verifying ownership. Returns `false` when the
    /// session does not exist or belongs to another account.
    async fn revoke(&self, session_id: Uuid, account_id: Uuid) -> Result<bool>;

    async fn revoke_all(&self, account_id: Uuid, except: Option<Uuid>) -> Result<u64>;

    /// Update last-activity without extending the session's expiry.
    async fn touch(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<()>;

    /// Delete expired rows. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append-only. Implementations must never mutate prior entries.
    async fn append(&self, entry: AuditEntry) -> Result<()>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomic create-or-increment of the fixed window for `key`. A window
    /// whose `reset_at` has passed is replaced by a fresh one counting
    /// this request. Over-counting by one under a race is acceptable;
    /// under-counting is not.
    async fn incr(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitWindow>;
}
