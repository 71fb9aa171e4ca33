//! Device-session registry.
//!
//! Sessions are the human-meaningful "signed-in devices" list, tracked
//! independently of token internals. The raw session token is returned
//! once at creation; the store only ever sees its hash. Sessions expire on
//! their own schedule and a periodic sweep deletes the expired rows.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::model::Session;
use crate::store::SessionStore;
use crate::util::{generate_opaque_token, hash_opaque_token};

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a session for a device. Returns the record and the raw
    /// opaque token, the only time the raw value exists.
    ///
    /// # Errors
    /// Returns an error when token generation or the store fails.
    pub async fn create(
        &self,
        account_id: Uuid,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<(Session, String)> {
        let token = generate_opaque_token()?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            account_id,
            token_hash: hash_opaque_token(&token),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.map(str::to_string),
            device_label: derive_device_label(user_agent),
            created_at: now,
            last_activity_at: now,
            expires_at: now + self.ttl,
            is_revoked: false,
        };
        self.store.insert(session.clone()).await?;
        info!(account_id = %account_id, session_id = %session.id, "Session created");
        Ok((session, token))
    }

    /// Active sessions, most recent activity first.
    ///
    /// # Errors
    /// Returns an error when the store fails.
    pub async fn list_active(&self, account_id: Uuid) -> Result<Vec<Session>> {
        self.store.list_active(account_id, Utc::now()).await
    }

    /// Revoke one session. Ownership is enforced: an account can revoke
    /// only its own sessions. Returns whether a session was revoked.
    ///
    /// # Errors
    /// Returns an error when the store fails.
    pub async fn revoke(&self, session_id: Uuid, account_id: Uuid) -> Result<bool> {
        let revoked = self.store.revoke(session_id, account_id).await?;
        if revoked {
            info!(session_id = %session_id, account_id = %account_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revoke every session for the account, optionally sparing one
    /// (the device performing a bulk sign-out). Returns the count revoked.
    ///
    /// # Errors
    /// Returns an error when the store fails.
    pub async fn revoke_all(&self, account_id: Uuid, except: Option<Uuid>) -> Result<u64> {
        let revoked = self.store.revoke_all(account_id, except).await?;
        info!(account_id = %account_id, revoked, "Sessions revoked");
        Ok(revoked)
    }

    /// Record activity for the session holding this raw token without
    /// extending its expiry.
    ///
    /// # Errors
    /// Returns an error when the store fails.
    pub async fn touch(&self, token: &str) -> Result<()> {
        self.store
            .touch(&hash_opaque_token(token), Utc::now())
            .await
    }

    /// Delete expired rows. Returns the count removed.
    ///
    /// # Errors
    /// Returns an error when the store fails.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "Expired sessions cleaned up");
        }
        Ok(removed)
    }
}

/// Best-effort "Browser on OS" label from the user-agent string. Display
/// only; never used for a security decision.
#[must_use]
pub fn derive_device_label(user_agent: Option<&str>) -> String {
    let Some(user_agent) = user_agent else {
        return "Unknown Device".to_string();
    };

    let browser = if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else if user_agent.contains("Edge") {
        "Edge"
    } else {
        "Unknown Browser"
    };

    let os = if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac") {
        "macOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iOS") || user_agent.contains("iPhone") {
        "iOS"
    } else {
        "Unknown OS"
    };

    format!("{browser} on {os}")
}
