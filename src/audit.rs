//! Append-only audit trail for security-relevant outcomes.
//!
//! Every decision is recorded before it is returned to the caller. A
//! failing sink is logged and otherwise ignored: the security decision was
//! already made safely, so availability wins over audit completeness.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::model::AuditEntry;
use crate::service::RequestContext;
use crate::store::AuditSink;

/// Action tags, one per security-relevant outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    LoginFailed,
    LoginSuccess,
    AccountLocked,
    TokenRefresh,
    Logout,
    TwoFactorEnabled,
    TwoFactorDisabled,
    PasswordResetRequested,
    PasswordResetCompleted,
    SessionRevoked,
    AllSessionsRevoked,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginFailed => "LOGIN_FAILED",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::TokenRefresh => "TOKEN_REFRESH",
            Self::Logout => "LOGOUT",
            Self::TwoFactorEnabled => "2FA_ENABLED",
            Self::TwoFactorDisabled => "2FA_DISABLED",
            Self::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            Self::PasswordResetCompleted => "PASSWORD_RESET_COMPLETED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::AllSessionsRevoked => "ALL_SESSIONS_REVOKED",
        }
    }
}

/// Reason tags qualifying a failure action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    GlobalRateLimitExceeded,
    IpRateLimitExceeded,
    AccountRateLimitExceeded,
    InvalidCredentials,
    InvalidPassword,
    AccountInactive,
    AccountLocked,
}

impl Reason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GlobalRateLimitExceeded => "GLOBAL_RATE_LIMIT_EXCEEDED",
            Self::IpRateLimitExceeded => "IP_RATE_LIMIT_EXCEEDED",
            Self::AccountRateLimitExceeded => "ACCOUNT_RATE_LIMIT_EXCEEDED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::AccountLocked => "ACCOUNT_LOCKED",
        }
    }
}

/// Sink wrapper enforcing the never-blocking policy.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an entry; failures are logged, never propagated.
    pub async fn record(
        &self,
        account_id: Option<Uuid>,
        email: &str,
        action: Action,
        reason: Option<Reason>,
        ctx: &RequestContext,
        metadata: Value,
    ) {
        let entry = AuditEntry {
            account_id,
            email: email.to_string(),
            action: action.as_str().to_string(),
            reason: reason.map(|reason| reason.as_str().to_string()),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            metadata,
            created_at: Utc::now(),
        };
        if let Err(err) = self.sink.append(entry).await {
            error!(email, action = action.as_str(), "Failed to write audit entry: {err}");
        }
    }
}
