//! In-memory store implementations.
//!
//! These back the test suite and the rate limiter's fail-open fallback.
//! Each store serializes its operations behind a single async mutex, which
//! satisfies the atomicity contracts of the traits without further care.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::Mailer;
use crate::model::{
    Account, AuditEntry, FailedAttempt, RateLimitWindow, RefreshTokenRecord, Session,
};
use crate::store::{AccountStore, AuditSink, RateLimitStore, RefreshTokenStore, SessionStore};

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts.lock().await.insert(account.id, account);
    }

    /// Test hook: read back the stored account.
    pub async fn get(&self, id: Uuid) -> Option<Account> {
        self.accounts.lock().await.get(&id).cloned()
    }

    /// Test hook: mutate the stored account in place.
    pub async fn update_with(&self, id: Uuid, f: impl FnOnce(&mut Account)) {
        if let Some(account) = self.accounts.lock().await.get_mut(&id) {
            f(account);
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| {
                account.reset_token_hash.as_deref() == Some(token_hash)
                    && account
                        .reset_token_expires_at
                        .is_some_and(|expires| expires > now)
            })
            .cloned())
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<FailedAttempt> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.failed_login_attempts += 1;
        let locked = account.failed_login_attempts >= threshold;
        if locked {
            account.is_locked = true;
            account.locked_until = Some(locked_until);
        }
        Ok(FailedAttempt {
            attempts: account.failed_login_attempts,
            locked,
        })
    }

    async fn reset_lockout(&self, id: Uuid) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.failed_login_attempts = 0;
        account.is_locked = false;
        account.locked_until = None;
        Ok(())
    }

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.last_login_at = Some(at);
        Ok(())
    }

    async fn set_pending_totp(
        &self,
        id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.totp_secret = Some(secret.to_string());
        account.backup_code_hashes = backup_code_hashes.to_vec();
        Ok(())
    }

    async fn enable_two_factor(&self, id: Uuid) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.two_factor_enabled = true;
        Ok(())
    }

    async fn disable_two_factor(&self, id: Uuid) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.two_factor_enabled = false;
        account.totp_secret = None;
        account.backup_code_hashes.clear();
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        let before = account.backup_code_hashes.len();
        account.backup_code_hashes.retain(|hash| hash != code_hash);
        Ok(account.backup_code_hashes.len() < before)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.reset_token_hash = Some(token_hash.to_vec());
        account.reset_token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn complete_password_reset(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account not found: {id}"))?;
        account.password_hash = password_hash.to_string();
        account.reset_token_hash = None;
        account.reset_token_expires_at = None;
        account.failed_login_attempts = 0;
        account.is_locked = false;
        account.locked_until = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: all records for an account.
    pub async fn records_for(&self, account_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.records
            .lock()
            .await
            .values()
            .filter(|record| record.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(record.token.clone(), record);
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.records.lock().await.get(token).cloned())
    }

    async fn revoke(&self, jti: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        for record in records.values_mut() {
            if record.jti == jti {
                record.is_revoked = true;
            }
        }
        Ok(())
    }

    async fn revoke_all_for(&self, account_id: Uuid) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.account_id == account_id && !record.is_revoked {
                record.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: raw session count, revoked and expired included.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        self.sessions.lock().await.insert(session.id, session);
        Ok(())
    }

    async fn list_active(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|session| session.account_id == account_id && session.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(active)
    }

    async fn revoke(&self, session_id: Uuid, account_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.account_id == account_id => {
                session.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all(&self, account_id: Uuid, except: Option<Uuid>) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if session.account_id == account_id
                && !session.is_revoked
                && Some(session.id) != except
            {
                session.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn touch(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.values_mut() {
            if session.token_hash == token_hash {
                session.last_activity_at = at;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, RateLimitWindow>>,
}

impl InMemoryRateLimitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn incr(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitWindow> {
        let mut windows = self.windows.lock().await;
        let entry = windows
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.reset_at <= now {
                    entry.count = 1;
                    entry.reset_at = now + window;
                } else {
                    entry.count += 1;
                }
            })
            .or_insert(RateLimitWindow {
                count: 1,
                reset_at: now + window,
            });
        Ok(*entry)
    }
}

/// Records outbound mail instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        self.sent
            .lock()
            .await
            .push((to.to_string(), subject.to_string(), body.to_string()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Account;

    fn account() -> Account {
        Account::new(
            "admin@example.com".to_string(),
            "Admin".to_string(),
            "$argon2id$stub".to_string(),
            vec!["admin".to_string()],
        )
    }

    #[tokio::test]
    async fn record_failed_attempt_locks_at_threshold() {
        let store = InMemoryAccountStore::new();
        let account = account();
        let id = account.id;
        store.insert(account).await;

        let locked_until = Utc::now() + Duration::minutes(30);
        for expected in 1..5u32 {
            let outcome = store
                .record_failed_attempt(id, 5, locked_until)
                .await
                .unwrap();
            assert_eq!(outcome.attempts, expected);
            assert!(!outcome.locked);
        }
        let outcome = store
            .record_failed_attempt(id, 5, locked_until)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 5);
        assert!(outcome.locked);

        let stored = store.get(id).await.unwrap();
        assert!(stored.is_locked);
        assert_eq!(stored.locked_until, Some(locked_until));
    }

    #[tokio::test]
    async fn consume_backup_code_is_single_use() {
        let store = InMemoryAccountStore::new();
        let mut account = account();
        account.backup_code_hashes = vec!["hash-a".to_string(), "hash-b".to_string()];
        let id = account.id;
        store.insert(account).await;

        assert!(store.consume_backup_code(id, "hash-a").await.unwrap());
        assert!(!store.consume_backup_code(id, "hash-a").await.unwrap());
        assert_eq!(store.get(id).await.unwrap().backup_code_hashes.len(), 1);
    }

    #[tokio::test]
    async fn refresh_revoke_is_idempotent() {
        let store = InMemoryRefreshTokenStore::new();
        let record = RefreshTokenRecord {
            token: "tok".to_string(),
            jti: "jti-1".to_string(),
            account_id: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::days(7),
            is_revoked: false,
        };
        store.insert(record).await.unwrap();

        store.revoke("jti-1").await.unwrap();
        store.revoke("jti-1").await.unwrap();
        store.revoke("unknown-jti").await.unwrap();
        assert!(store.find_by_token("tok").await.unwrap().unwrap().is_revoked);
    }

    #[tokio::test]
    async fn rate_limit_window_resets_after_expiry() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::minutes(15);

        for expected in 1..=3u32 {
            let state = store.incr("critical:1.2.3.4", window, now).await.unwrap();
            assert_eq!(state.count, expected);
        }

        let later = now + Duration::minutes(16);
        let state = store.incr("critical:1.2.3.4", window, later).await.unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.reset_at, later + window);
    }

    #[tokio::test]
    async fn session_revoke_checks_ownership() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let session = Session {
            id: Uuid::new_v4(),
            account_id: owner,
            token_hash: vec![1u8; 32],
            ip_address: "1.2.3.4".to_string(),
            user_agent: None,
            device_label: "Unknown Device".to_string(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + Duration::days(90),
            is_revoked: false,
        };
        let session_id = session.id;
        store.insert(session).await.unwrap();

        assert!(!store.revoke(session_id, stranger).await.unwrap());
        assert_eq!(store.list_active(owner, now).await.unwrap().len(), 1);
        assert!(store.revoke(session_id, owner).await.unwrap());
        assert!(store.list_active(owner, now).await.unwrap().is_empty());
    }
}
