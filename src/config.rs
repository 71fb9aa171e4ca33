//! Gateway configuration, built once at startup and validated eagerly.
//!
//! Every knob has a documented default; nothing is read from the
//! environment implicitly. Production-like deployments must supply a real
//! signing secret or construction fails fast.

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_MINUTES: i64 = 30;
const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_SESSION_TTL_DAYS: i64 = 90;
const DEFAULT_RESET_TOKEN_TTL_MINUTES: i64 = 60;
const DEFAULT_BACKUP_CODE_COUNT: usize = 8;
const DEFAULT_ISSUER: &str = "gardisto";
const DEFAULT_AUDIENCE: &str = "admin";
const DEFAULT_TOTP_ISSUER: &str = "Gardisto Admin";
const MIN_SECRET_BYTES: usize = 32;

/// Development tolerates this placeholder secret; production rejects it.
const DEV_TOKEN_SECRET: &str = "development-only-secret-do-not-deploy-0000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("token secret must be set in production; generate one with: openssl rand -base64 32")]
    MissingTokenSecret,
    #[error("token secret must be at least {MIN_SECRET_BYTES} bytes")]
    WeakTokenSecret,
    #[error("{0} must be positive")]
    NonPositiveDuration(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Configuration for the authentication gateway.
#[derive(Clone)]
pub struct AuthConfig {
    environment: Environment,
    token_secret: SecretString,
    issuer: String,
    audience: String,
    totp_issuer: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    backup_code_count: usize,
    session_ttl: Duration,
    reset_token_ttl: Duration,
    count_rate_limited_toward_lockout: bool,
}

impl AuthConfig {
    /// Production-grade configuration with an explicit signing secret.
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self::with_environment(Environment::Production, token_secret)
    }

    /// Local-development configuration with a placeholder secret.
    #[must_use]
    pub fn development() -> Self {
        Self::with_environment(
            Environment::Development,
            SecretString::from(DEV_TOKEN_SECRET.to_string()),
        )
    }

    fn with_environment(environment: Environment, token_secret: SecretString) -> Self {
        Self {
            environment,
            token_secret,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            access_token_ttl: Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
            refresh_token_ttl: Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
            backup_code_count: DEFAULT_BACKUP_CODE_COUNT,
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            reset_token_ttl: Duration::minutes(DEFAULT_RESET_TOKEN_TTL_MINUTES),
            count_rate_limited_toward_lockout: false,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    #[must_use]
    pub fn with_backup_code_count(mut self, count: usize) -> Self {
        self.backup_code_count = count;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl(mut self, ttl: Duration) -> Self {
        self.reset_token_ttl = ttl;
        self
    }

    /// Product decision point: whether an account-tier rate-limit rejection
    /// also records a failed attempt for lockout purposes. Off by default.
    #[must_use]
    pub fn with_count_rate_limited_toward_lockout(mut self, enabled: bool) -> Self {
        self.count_rate_limited_toward_lockout = enabled;
        self
    }

    /// Reject configurations that would silently weaken the gateway.
    ///
    /// # Errors
    /// Returns a `ConfigError` when the signing secret is missing, the
    /// placeholder, or too short in production, or when a TTL is
    /// non-positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production {
            let secret = self.token_secret.expose_secret();
            if secret.is_empty() || secret == DEV_TOKEN_SECRET {
                return Err(ConfigError::MissingTokenSecret);
            }
            if secret.len() < MIN_SECRET_BYTES {
                return Err(ConfigError::WeakTokenSecret);
            }
        }
        for (name, duration) in [
            ("access token TTL", self.access_token_ttl),
            ("refresh token TTL", self.refresh_token_ttl),
            ("lockout duration", self.lockout_duration),
            ("session TTL", self.session_ttl),
            ("reset token TTL", self.reset_token_ttl),
        ] {
            if duration <= Duration::zero() {
                return Err(ConfigError::NonPositiveDuration(name));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub(crate) fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    #[must_use]
    pub fn backup_code_count(&self) -> usize {
        self.backup_code_count
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn reset_token_ttl(&self) -> Duration {
        self.reset_token_ttl
    }

    #[must_use]
    pub fn count_rate_limited_toward_lockout(&self) -> bool {
        self.count_rate_limited_toward_lockout
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("environment", &self.environment)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("max_failed_attempts", &self.max_failed_attempts)
            .field("lockout_duration", &self.lockout_duration)
            .finish_non_exhaustive()
    }
}
