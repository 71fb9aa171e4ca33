//! Authentication flows.
//!
//! Flow Overview:
//! 1) A login attempt passes the layered rate-limit gate, then credential
//!    verification against the lockout state machine.
//! 2) Accounts with a second factor move to a pending state; a TOTP or
//!    backup code completes authentication.
//! 3) Entering the authenticated state always performs, in order: reset
//!    the failed-attempt counter, issue the token pair, persist the
//!    refresh record, create a device session, stamp last-login, and
//!    write the audit entry. A failure part-way through propagates, so
//!    credentials are never handed out without their trail.
//!
//! Security boundaries:
//! - Unknown-email and wrong-password return the same error.
//! - All outcomes are audited before returning; a failing audit sink is
//!   logged and ignored, never allowed to reverse a decision.
//! - Notification side effects leave through domain events and the mailer
//!   capability, never inline I/O in the decision path.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{Action, AuditLog, Reason};
use crate::config::{AuthConfig, ConfigError};
use crate::error::AuthError;
use crate::events::{AuthEvent, EventSink, Mailer};
use crate::lockout::LockoutPolicy;
use crate::model::{Account, RefreshTokenRecord, Session};
use crate::password::{hash_password, verify_password};
use crate::rate_limit::{LimitScope, RateLimitTier, RateLimiter};
use crate::session::SessionRegistry;
use crate::store::{AccountStore, AuditSink, RefreshTokenStore, SessionStore};
use crate::token::{Claims, TokenKind, TokenPair, TokenService};
use crate::twofactor::{TwoFactorEngine, TwoFactorSetup};
use crate::util::{generate_opaque_token, hash_opaque_token, normalize_email, valid_email};

/// Per-request caller context used for auditing and session labeling.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(ip_address: impl Into<String>, user_agent: Option<&str>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.map(str::to_string),
        }
    }
}

/// The caller-facing slice of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl From<&Account> for UserSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            roles: account.roles.clone(),
        }
    }
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Password accepted; a second factor must complete the login.
    Requires2FA { user: UserSummary },
    Authenticated { user: UserSummary, tokens: TokenPair },
}

/// Result of the refresh flow: a fresh access token only.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// The composition root: owns every collaborator and exposes the
/// authentication operations.
pub struct AuthService {
    config: AuthConfig,
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    sessions: SessionRegistry,
    audit: AuditLog,
    rate_limiter: Arc<RateLimiter>,
    tokens: TokenService,
    two_factor: TwoFactorEngine,
    lockout: LockoutPolicy,
    mailer: Arc<dyn Mailer>,
    events: Arc<dyn EventSink>,
}

impl AuthService {
    /// Wire the gateway. Validates the configuration eagerly so a missing
    /// production secret fails at startup, not at first use.
    ///
    /// # Errors
    /// Returns a `ConfigError` for invalid configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        session_store: Arc<dyn SessionStore>,
        audit_sink: Arc<dyn AuditSink>,
        rate_limiter: Arc<RateLimiter>,
        mailer: Arc<dyn Mailer>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tokens = TokenService::new(&config);
        let two_factor = TwoFactorEngine::new(
            config.totp_issuer().to_string(),
            config.backup_code_count(),
        );
        let lockout = LockoutPolicy::new(config.max_failed_attempts(), config.lockout_duration());
        let sessions = SessionRegistry::new(session_store, config.session_ttl());
        Ok(Self {
            config,
            accounts,
            refresh_tokens,
            sessions,
            audit: AuditLog::new(audit_sink),
            rate_limiter,
            tokens,
            two_factor,
            lockout,
            mailer,
            events,
        })
    }

    /// Authenticate an email/password pair.
    ///
    /// # Errors
    /// `RateLimited`, `InvalidCredentials` (identical for unknown email
    /// and wrong password), `AccountInactive`, `AccountLocked`, or
    /// `Storage`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let now = Utc::now();

        if let Err(exceeded) = self
            .rate_limiter
            .check_login(&ctx.ip_address, &email, now)
            .await
        {
            let reason = match exceeded.scope {
                LimitScope::Global => Reason::GlobalRateLimitExceeded,
                LimitScope::Ip => Reason::IpRateLimitExceeded,
                LimitScope::Account => Reason::AccountRateLimitExceeded,
            };
            warn!(ip = %ctx.ip_address, scope = ?exceeded.scope, "Login rate limit exceeded");
            self.audit
                .record(None, &email, Action::LoginFailed, Some(reason), ctx, json!({}))
                .await;
            if exceeded.scope == LimitScope::Account
                && self.config.count_rate_limited_toward_lockout()
            {
                self.count_rate_limited_attempt(&email, now).await;
            }
            return Err(AuthError::RateLimited {
                scope: exceeded.scope,
                reset_at: exceeded.decision.reset_at,
            });
        }

        if !valid_email(&email) {
            self.audit
                .record(
                    None,
                    &email,
                    Action::LoginFailed,
                    Some(Reason::InvalidCredentials),
                    ctx,
                    json!({}),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        let account = self
            .accounts
            .find_by_email(&email)
            .await
            .map_err(AuthError::storage)?;
        let Some(mut account) = account else {
            warn!(email = %email, "Login attempt for unknown account");
            self.audit
                .record(
                    None,
                    &email,
                    Action::LoginFailed,
                    Some(Reason::InvalidCredentials),
                    ctx,
                    json!({}),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !account.is_active {
            warn!(account_id = %account.id, "Login attempt for inactive account");
            self.audit
                .record(
                    Some(account.id),
                    &email,
                    Action::LoginFailed,
                    Some(Reason::AccountInactive),
                    ctx,
                    json!({}),
                )
                .await;
            return Err(AuthError::AccountInactive);
        }

        if self.lockout.is_locked(&account, now) {
            let remaining_minutes = self.lockout.remaining_minutes(&account, now);
            warn!(account_id = %account.id, "Login attempt for locked account");
            self.audit
                .record(
                    Some(account.id),
                    &email,
                    Action::LoginFailed,
                    Some(Reason::AccountLocked),
                    ctx,
                    json!({ "lockedUntil": account.locked_until }),
                )
                .await;
            return Err(AuthError::AccountLocked { remaining_minutes });
        }

        if !verify_password(password, &account.password_hash) {
            return Err(self.record_invalid_password(&account, ctx, now).await);
        }

        if account.failed_login_attempts > 0 {
            self.accounts
                .reset_lockout(account.id)
                .await
                .map_err(AuthError::storage)?;
            account.failed_login_attempts = 0;
            account.is_locked = false;
            account.locked_until = None;
        }

        if account.two_factor_enabled {
            info!(account_id = %account.id, "Login requires second factor");
            return Ok(LoginOutcome::Requires2FA {
                user: UserSummary::from(&account),
            });
        }

        let tokens = self.finalize_login(&account, ctx).await?;
        Ok(LoginOutcome::Authenticated {
            user: UserSummary::from(&account),
            tokens,
        })
    }

    /// Complete a pending login with a TOTP or backup code.
    ///
    /// # Errors
    /// `TwoFactorNotConfigured`, `InvalidSecondFactor`, `AccountInactive`,
    /// or `Storage`. Second-factor failures do not count toward the
    /// password lockout counter.
    pub async fn verify_two_factor(
        &self,
        account_id: Uuid,
        code: &str,
        is_backup_code: bool,
        ctx: &RequestContext,
    ) -> Result<(UserSummary, TokenPair), AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::TwoFactorNotConfigured)?;
        let Some(secret) = account
            .totp_secret
            .as_deref()
            .filter(|_| account.two_factor_enabled)
        else {
            return Err(AuthError::TwoFactorNotConfigured);
        };
        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }

        let valid = if is_backup_code {
            match self
                .two_factor
                .find_backup_code_match(code, &account.backup_code_hashes)
            {
                Some(hash) => {
                    // The consume is the atomicity point: a concurrent
                    // request presenting the same code loses here.
                    let consumed = self
                        .accounts
                        .consume_backup_code(account.id, &hash)
                        .await
                        .map_err(AuthError::storage)?;
                    if consumed {
                        info!(account_id = %account.id, "Backup code used for second factor");
                    }
                    consumed
                }
                None => false,
            }
        } else {
            self.two_factor.verify_totp(secret, code)
        };

        if !valid {
            warn!(account_id = %account.id, "Invalid second-factor code");
            return Err(AuthError::InvalidSecondFactor);
        }

        let tokens = self.finalize_login(&account, ctx).await?;
        Ok((UserSummary::from(&account), tokens))
    }

    /// Exchange a refresh token for a fresh access token. Refresh tokens
    /// are not rotated here; rotation happens at password reset or
    /// explicit revocation.
    ///
    /// # Errors
    /// `InvalidToken` for any bad token (signature, kind, unknown record,
    /// revoked, expired), `AccountInactive`, or `Storage`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<RefreshedAccess, AuthError> {
        // Signature and kind first; the persistent record is checked as
        // well for defense in depth beyond the signature's own expiry.
        self.tokens.verify(refresh_token, TokenKind::Refresh)?;

        let record = self
            .refresh_tokens
            .find_by_token(refresh_token)
            .await
            .map_err(AuthError::storage)?;
        let Some(record) = record else {
            warn!("Refresh attempt with unknown token");
            return Err(AuthError::InvalidToken);
        };
        if record.is_revoked {
            warn!(jti = %record.jti, "Refresh attempt with revoked token");
            return Err(AuthError::InvalidToken);
        }
        if record.expires_at <= Utc::now() {
            warn!(jti = %record.jti, "Refresh attempt with expired token record");
            return Err(AuthError::InvalidToken);
        }

        let account = self
            .accounts
            .find_by_id(record.account_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::InvalidToken)?;
        if !account.is_active {
            warn!(account_id = %account.id, "Token refresh for inactive account");
            return Err(AuthError::AccountInactive);
        }

        let (access_token, expires_at) = self
            .tokens
            .issue_access(&account)
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account.id),
                &account.email,
                Action::TokenRefresh,
                None,
                ctx,
                json!({ "jti": record.jti }),
            )
            .await;
        info!(account_id = %account.id, "Access token refreshed");
        Ok(RefreshedAccess {
            access_token,
            expires_at,
        })
    }

    /// Revoke the presented refresh token, if any. Idempotent and always
    /// succeeds from the caller's perspective; internal failures are
    /// logged.
    pub async fn logout(&self, refresh_token: Option<&str>, ctx: &RequestContext) {
        let Some(token) = refresh_token else {
            return;
        };
        match self.refresh_tokens.find_by_token(token).await {
            Ok(Some(record)) => {
                if let Err(err) = self.refresh_tokens.revoke(&record.jti).await {
                    error!("Failed to revoke refresh token: {err}");
                    return;
                }
                let email = match self.accounts.find_by_id(record.account_id).await {
                    Ok(Some(account)) => account.email,
                    _ => String::new(),
                };
                self.audit
                    .record(
                        Some(record.account_id),
                        &email,
                        Action::Logout,
                        None,
                        ctx,
                        json!({ "jti": record.jti }),
                    )
                    .await;
                info!(account_id = %record.account_id, "Logged out");
            }
            Ok(None) => {}
            Err(err) => error!("Error during logout: {err}"),
        }
    }

    /// Verify a bearer access token and return its claims.
    ///
    /// # Errors
    /// `InvalidToken` for any failure, including a refresh token
    /// presented as an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(token, TokenKind::Access)
    }

    /// Begin second-factor enrollment. The returned secret and backup
    /// codes are shown exactly once and never retrievable again; the
    /// pending secret does not gate login until enabled.
    ///
    /// # Errors
    /// `Validation` when the account is unknown or already enrolled,
    /// `Storage` otherwise.
    pub async fn setup_two_factor(&self, account_id: Uuid) -> Result<TwoFactorSetup, AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::Validation("account not found"))?;
        if account.two_factor_enabled {
            return Err(AuthError::Validation(
                "two-factor authentication is already enabled",
            ));
        }

        let secret = self.two_factor.generate_secret().map_err(AuthError::storage)?;
        let provisioning_uri = self
            .two_factor
            .provisioning_uri(&secret, &account.email)
            .map_err(AuthError::storage)?;
        let batch = self
            .two_factor
            .generate_backup_codes()
            .map_err(AuthError::storage)?;
        self.accounts
            .set_pending_totp(account.id, &secret, &batch.hashes)
            .await
            .map_err(AuthError::storage)?;
        info!(account_id = %account.id, "Two-factor setup initiated");
        Ok(TwoFactorSetup {
            secret,
            provisioning_uri,
            backup_codes: batch.codes,
        })
    }

    /// Flip the enabled flag after one valid code against the pending
    /// secret.
    ///
    /// # Errors
    /// `TwoFactorNotConfigured` without a pending secret,
    /// `InvalidSecondFactor` for a wrong code, `Storage` otherwise.
    pub async fn enable_two_factor(
        &self,
        account_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::Validation("account not found"))?;
        let Some(secret) = account.totp_secret.as_deref() else {
            return Err(AuthError::TwoFactorNotConfigured);
        };

        if !self.two_factor.verify_totp(secret, code) {
            warn!(account_id = %account.id, "Invalid code during two-factor enable");
            return Err(AuthError::InvalidSecondFactor);
        }

        self.accounts
            .enable_two_factor(account.id)
            .await
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account.id),
                &account.email,
                Action::TwoFactorEnabled,
                None,
                ctx,
                json!({}),
            )
            .await;
        self.events.emit(AuthEvent::TwoFactorEnabled {
            email: account.email.clone(),
        });
        info!(account_id = %account.id, "Two-factor authentication enabled");
        Ok(())
    }

    /// Clear the secret, backup codes, and flag in one operation. The
    /// caller already holds an authenticated session; no re-verification,
    /// but the action is separately audited and notified.
    ///
    /// # Errors
    /// `Validation` for an unknown account, `Storage` otherwise.
    pub async fn disable_two_factor(
        &self,
        account_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::Validation("account not found"))?;

        self.accounts
            .disable_two_factor(account.id)
            .await
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account.id),
                &account.email,
                Action::TwoFactorDisabled,
                None,
                ctx,
                json!({}),
            )
            .await;
        self.events.emit(AuthEvent::TwoFactorDisabled {
            email: account.email.clone(),
        });
        info!(account_id = %account.id, "Two-factor authentication disabled");
        Ok(())
    }

    /// Active device sessions, most recent activity first.
    ///
    /// # Errors
    /// `Storage` when the store fails.
    pub async fn list_sessions(&self, account_id: Uuid) -> Result<Vec<Session>, AuthError> {
        self.sessions
            .list_active(account_id)
            .await
            .map_err(AuthError::storage)
    }

    /// Revoke one of the account's own sessions. Returns whether a
    /// session was revoked.
    ///
    /// # Errors
    /// `Storage` when the store fails.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        account_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<bool, AuthError> {
        let revoked = self
            .sessions
            .revoke(session_id, account_id)
            .await
            .map_err(AuthError::storage)?;
        if revoked {
            self.audit
                .record(
                    Some(account_id),
                    "",
                    Action::SessionRevoked,
                    None,
                    ctx,
                    json!({ "sessionId": session_id }),
                )
                .await;
        }
        Ok(revoked)
    }

    /// Bulk sign-out, optionally sparing the calling device's session.
    ///
    /// # Errors
    /// `Storage` when the store fails.
    pub async fn revoke_all_sessions(
        &self,
        account_id: Uuid,
        except: Option<Uuid>,
        ctx: &RequestContext,
    ) -> Result<u64, AuthError> {
        let revoked = self
            .sessions
            .revoke_all(account_id, except)
            .await
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account_id),
                "",
                Action::AllSessionsRevoked,
                None,
                ctx,
                json!({ "revoked": revoked }),
            )
            .await;
        Ok(revoked)
    }

    /// Issue a single-use, time-boxed reset token through the mailer.
    /// Succeeds whether or not the email exists so callers cannot probe
    /// for accounts.
    ///
    /// # Errors
    /// `RateLimited` or `Storage`; never "not found".
    pub async fn request_password_reset(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let now = Utc::now();

        let decision = self
            .rate_limiter
            .check_at(&ctx.ip_address, RateLimitTier::Critical, now)
            .await;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                scope: LimitScope::Ip,
                reset_at: decision.reset_at,
            });
        }

        let account = self
            .accounts
            .find_by_email(&email)
            .await
            .map_err(AuthError::storage)?;
        let Some(account) = account else {
            warn!(email = %email, "Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_opaque_token().map_err(AuthError::storage)?;
        let token_hash = hash_opaque_token(&token);
        self.accounts
            .set_reset_token(
                account.id,
                &token_hash,
                now + self.config.reset_token_ttl(),
            )
            .await
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account.id),
                &email,
                Action::PasswordResetRequested,
                None,
                ctx,
                json!({}),
            )
            .await;
        self.events.emit(AuthEvent::PasswordResetRequested {
            email: email.clone(),
        });

        let minutes = self.config.reset_token_ttl().num_minutes();
        let body = format!(
            "Use this single-use code within {minutes} minutes to reset your password: {token}"
        );
        if !self.mailer.send(&account.email, "Reset your password", &body).await {
            warn!(account_id = %account.id, "Failed to send password reset email");
        }
        Ok(())
    }

    /// Consume a reset token: install the new password, clear the lockout
    /// state, and revoke every outstanding refresh token and session.
    ///
    /// # Errors
    /// `Validation` for a too-short password, `InvalidToken` for a
    /// missing/expired token, `Storage` otherwise.
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation(
                "password must be at least 8 characters",
            ));
        }
        let now = Utc::now();
        let account = self
            .accounts
            .find_by_reset_token_hash(&hash_opaque_token(token), now)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::InvalidToken)?;

        let password_hash = hash_password(new_password).map_err(AuthError::storage)?;
        self.accounts
            .complete_password_reset(account.id, &password_hash)
            .await
            .map_err(AuthError::storage)?;
        self.refresh_tokens
            .revoke_all_for(account.id)
            .await
            .map_err(AuthError::storage)?;
        self.sessions
            .revoke_all(account.id, None)
            .await
            .map_err(AuthError::storage)?;
        self.audit
            .record(
                Some(account.id),
                &account.email,
                Action::PasswordResetCompleted,
                None,
                ctx,
                json!({}),
            )
            .await;
        self.events.emit(AuthEvent::PasswordResetCompleted {
            email: account.email.clone(),
        });
        info!(account_id = %account.id, "Password reset completed");
        Ok(())
    }

    /// Sweep expired device sessions; the rate limiter's sweeper is
    /// spawned separately via [`RateLimiter::spawn_sweeper`].
    ///
    /// # Errors
    /// `Storage` when the store fails.
    pub async fn sweep_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions
            .sweep_expired()
            .await
            .map_err(AuthError::storage)
    }

    /// The effects of entering the authenticated state, in order: counter
    /// reset, token issuance, refresh-record persistence, session
    /// creation, last-login stamp, and finally the audit entry. Any
    /// failure propagates before credentials reach the caller.
    async fn finalize_login(
        &self,
        account: &Account,
        ctx: &RequestContext,
    ) -> Result<TokenPair, AuthError> {
        if account.failed_login_attempts > 0 {
            self.accounts
                .reset_lockout(account.id)
                .await
                .map_err(AuthError::storage)?;
        }

        let tokens = self.tokens.issue_pair(account).map_err(AuthError::storage)?;
        let record = RefreshTokenRecord {
            token: tokens.refresh_token.clone(),
            jti: tokens.refresh_token_jti.clone(),
            account_id: account.id,
            expires_at: Utc::now() + self.tokens.refresh_ttl(),
            is_revoked: false,
        };
        self.refresh_tokens
            .insert(record)
            .await
            .map_err(AuthError::storage)?;

        self.sessions
            .create(account.id, &ctx.ip_address, ctx.user_agent.as_deref())
            .await
            .map_err(AuthError::storage)?;
        self.accounts
            .set_last_login(account.id, Utc::now())
            .await
            .map_err(AuthError::storage)?;

        self.audit
            .record(
                Some(account.id),
                &account.email,
                Action::LoginSuccess,
                None,
                ctx,
                json!({}),
            )
            .await;
        info!(account_id = %account.id, "Successful login");
        Ok(tokens)
    }

    async fn record_invalid_password(
        &self,
        account: &Account,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> AuthError {
        let attempt = match self
            .accounts
            .record_failed_attempt(
                account.id,
                self.lockout.threshold(),
                self.lockout.lock_expiry(now),
            )
            .await
        {
            Ok(attempt) => attempt,
            Err(err) => return AuthError::storage(err),
        };
        warn!(
            account_id = %account.id,
            attempts = attempt.attempts,
            "Invalid password attempt"
        );

        if attempt.locked {
            self.events.emit(AuthEvent::AccountLocked {
                email: account.email.clone(),
                attempts: attempt.attempts,
                ip_address: ctx.ip_address.clone(),
            });
        } else if attempt.attempts >= self.lockout.spike_threshold() {
            self.events.emit(AuthEvent::FailedLoginSpike {
                email: account.email.clone(),
                attempts: attempt.attempts,
                ip_address: ctx.ip_address.clone(),
            });
        }
        if attempt.attempts >= 3 {
            self.events.emit(AuthEvent::SuspiciousLogin {
                email: account.email.clone(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                at: now,
            });
        }

        let action = if attempt.locked {
            Action::AccountLocked
        } else {
            Action::LoginFailed
        };
        self.audit
            .record(
                Some(account.id),
                &account.email,
                action,
                Some(Reason::InvalidPassword),
                ctx,
                json!({ "failedAttempts": attempt.attempts }),
            )
            .await;

        if attempt.locked {
            AuthError::AccountLocked {
                remaining_minutes: self.lockout.duration_minutes(),
            }
        } else {
            AuthError::InvalidCredentials
        }
    }

    /// Optional product behavior: an account-tier rate-limit rejection
    /// also records a failed attempt for a known account.
    async fn count_rate_limited_attempt(&self, email: &str, now: DateTime<Utc>) {
        match self.accounts.find_by_email(email).await {
            Ok(Some(account)) => {
                if let Err(err) = self
                    .accounts
                    .record_failed_attempt(
                        account.id,
                        self.lockout.threshold(),
                        self.lockout.lock_expiry(now),
                    )
                    .await
                {
                    error!("Failed to count rate-limited attempt: {err}");
                }
            }
            Ok(None) => {}
            Err(err) => error!("Failed to look up account for rate-limited attempt: {err}"),
        }
    }
}
