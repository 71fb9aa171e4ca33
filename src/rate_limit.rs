//! Tiered rate limiting.
//!
//! Flow Overview:
//! 1) Each tier pairs a request budget with a fixed window; identifiers are
//!    counted per `tier:identifier` key.
//! 2) Counting prefers the pluggable [`RateLimitStore`] so limits hold
//!    across instances.
//! 3) When the store is unavailable the limiter falls back to a
//!    process-local window map: it fails open to an approximation, never
//!    closed, and never silently off (the fallback is logged).
//!
//! The fixed window is an approximation of a sliding window; sensitivity
//! here is on the order of minutes, so a window that resets wholesale is
//! acceptable.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::RateLimitWindow;
use crate::store::RateLimitStore;

/// Named budget buckets by endpoint sensitivity, plus the account-keyed
/// and global circuit-breaker tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitTier {
    /// Login, password reset.
    Critical,
    /// Two-factor setup, session management.
    Sensitive,
    /// Dashboard access, data fetching.
    Standard,
    /// Health checks, static assets.
    Public,
    /// Keyed by account identifier, not IP; blunts distributed
    /// credential stuffing.
    PerAccount,
    /// Single shared key; trips before the infrastructure does.
    Global,
}

impl RateLimitTier {
    #[must_use]
    pub fn max_requests(self) -> u32 {
        match self {
            Self::Critical => 5,
            Self::Sensitive => 10,
            Self::Standard => 60,
            Self::Public => 100,
            Self::PerAccount => 5,
            Self::Global => 1000,
        }
    }

    #[must_use]
    pub fn window(self) -> Duration {
        match self {
            Self::Critical | Self::Sensitive | Self::PerAccount => Duration::minutes(15),
            Self::Standard | Self::Public | Self::Global => Duration::minutes(1),
        }
    }

    #[must_use]
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Sensitive => "sensitive",
            Self::Standard => "standard",
            Self::Public => "public",
            Self::PerAccount => "account",
            Self::Global => "global",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Which layer of the login gate rejected the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    Ip,
    Account,
}

/// A login-gate rejection with the decision that produced it.
#[derive(Clone, Copy, Debug)]
pub struct LimitExceeded {
    pub scope: LimitScope,
    pub decision: RateLimitDecision,
}

pub struct RateLimiter {
    store: Option<Arc<dyn RateLimitStore>>,
    fallback: Mutex<HashMap<String, RateLimitWindow>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store: Some(store),
            fallback: Mutex::new(HashMap::new()),
        }
    }

    /// Purely process-local limiter; used when no shared store is wired.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: None,
            fallback: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, identifier: &str, tier: RateLimitTier) -> RateLimitDecision {
        self.check_at(identifier, tier, Utc::now()).await
    }

    /// Clock-explicit variant of [`check`](Self::check).
    pub async fn check_at(
        &self,
        identifier: &str,
        tier: RateLimitTier,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let key = format!("{}:{identifier}", tier.key_prefix());
        if let Some(store) = &self.store {
            match store.incr(&key, tier.window(), now).await {
                Ok(window) => return Self::decision(tier, window),
                Err(err) => {
                    warn!(
                        tier = tier.key_prefix(),
                        "Rate limit store unavailable, falling back to in-memory: {err}"
                    );
                }
            }
        }
        self.check_fallback(&key, tier, now).await
    }

    /// Layered login gate: global circuit breaker, then the caller's IP,
    /// then the account identifier. The first rejection wins.
    ///
    /// # Errors
    /// Returns the scope and decision of the exceeded layer.
    pub async fn check_login(
        &self,
        ip_address: &str,
        account_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LimitExceeded> {
        let decision = self.check_at("global", RateLimitTier::Global, now).await;
        if !decision.allowed {
            warn!("Global rate limit exceeded");
            return Err(LimitExceeded {
                scope: LimitScope::Global,
                decision,
            });
        }

        let decision = self.check_at(ip_address, RateLimitTier::Critical, now).await;
        if !decision.allowed {
            return Err(LimitExceeded {
                scope: LimitScope::Ip,
                decision,
            });
        }

        let decision = self
            .check_at(account_key, RateLimitTier::PerAccount, now)
            .await;
        if !decision.allowed {
            return Err(LimitExceeded {
                scope: LimitScope::Account,
                decision,
            });
        }

        Ok(())
    }

    async fn check_fallback(
        &self,
        key: &str,
        tier: RateLimitTier,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let limit = tier.max_requests();
        let mut windows = self.fallback.lock().await;
        let window = windows.entry(key.to_string()).or_insert(RateLimitWindow {
            count: 0,
            reset_at: now + tier.window(),
        });
        if window.reset_at <= now {
            window.count = 0;
            window.reset_at = now + tier.window();
        }
        if window.count >= limit {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: window.reset_at,
            };
        }
        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - window.count,
            reset_at: window.reset_at,
        }
    }

    fn decision(tier: RateLimitTier, window: RateLimitWindow) -> RateLimitDecision {
        let limit = tier.max_requests();
        RateLimitDecision {
            allowed: window.count <= limit,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_at: window.reset_at,
        }
    }

    /// Evict expired fallback windows to bound memory. Returns the number
    /// removed. Holds only the local map lock; no I/O.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.fallback.lock().await;
        let before = windows.len();
        windows.retain(|_, window| window.reset_at > now);
        before - windows.len()
    }

    /// Spawn the periodic eviction task, the limiter's only background
    /// work.
    pub fn spawn_sweeper(self: &Arc<Self>, period: std::time::Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = limiter.sweep().await;
                if removed > 0 {
                    debug!(removed, "Evicted expired rate limit windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LimitScope, RateLimitTier, RateLimiter};
    use crate::model::RateLimitWindow;
    use crate::store::memory::InMemoryRateLimitStore;
    use crate::store::RateLimitStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn incr(
            &self,
            _key: &str,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> anyhow::Result<RateLimitWindow> {
            Err(anyhow!("store down"))
        }
    }

    #[tokio::test]
    async fn critical_tier_blocks_sixth_call_and_recovers() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        for _ in 0..5 {
            let decision = limiter
                .check_at("1.2.3.4", RateLimitTier::Critical, now)
                .await;
            assert!(decision.allowed);
        }

        let decision = limiter
            .check_at("1.2.3.4", RateLimitTier::Critical, now)
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        let later = now + Duration::minutes(16);
        let decision = limiter
            .check_at("1.2.3.4", RateLimitTier::Critical, later)
            .await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn identifiers_are_counted_separately() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        for _ in 0..5 {
            limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await;
        }
        assert!(!limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await.allowed);
        assert!(limiter.check_at("5.6.7.8", RateLimitTier::Critical, now).await.allowed);
    }

    #[tokio::test]
    async fn tiers_are_counted_separately() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        for _ in 0..5 {
            limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await;
        }
        assert!(!limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await.allowed);
        assert!(limiter.check_at("1.2.3.4", RateLimitTier::Standard, now).await.allowed);
    }

    #[tokio::test]
    async fn store_backed_counting_matches_fallback() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()));
        let now = Utc::now();

        for remaining in (0..5u32).rev() {
            let decision = limiter
                .check_at("1.2.3.4", RateLimitTier::Critical, now)
                .await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }
        assert!(!limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await.allowed);
    }

    #[tokio::test]
    async fn failing_store_falls_open_to_memory() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));
        let now = Utc::now();

        // Traffic keeps flowing and the fallback still enforces the budget.
        for _ in 0..5 {
            assert!(limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await.allowed);
        }
        assert!(!limiter.check_at("1.2.3.4", RateLimitTier::Critical, now).await.allowed);
    }

    #[tokio::test]
    async fn login_gate_limits_account_across_ips() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        // Distributed credential stuffing: one account, many IPs. The
        // per-account layer trips even though every IP is fresh.
        for index in 0..5 {
            assert!(limiter
                .check_login(&format!("10.0.0.{index}"), "admin@example.com", now)
                .await
                .is_ok());
        }
        let exceeded = limiter
            .check_login("10.0.0.99", "admin@example.com", now)
            .await
            .unwrap_err();
        assert_eq!(exceeded.scope, LimitScope::Account);
    }

    #[tokio::test]
    async fn login_gate_limits_ip_across_accounts() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        // One IP spraying many accounts trips the IP layer.
        for index in 0..5 {
            assert!(limiter
                .check_login("1.2.3.4", &format!("victim{index}@example.com"), now)
                .await
                .is_ok());
        }
        let exceeded = limiter
            .check_login("1.2.3.4", "victim99@example.com", now)
            .await
            .unwrap_err();
        assert_eq!(exceeded.scope, LimitScope::Ip);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_windows() {
        let limiter = RateLimiter::in_memory();
        let now = Utc::now();

        limiter.check_at("1.2.3.4", RateLimitTier::Standard, now).await;
        limiter.check_at("5.6.7.8", RateLimitTier::Critical, now).await;

        assert_eq!(limiter.sweep_at(now).await, 0);
        // Standard window (1 min) has elapsed, critical (15 min) has not.
        assert_eq!(limiter.sweep_at(now + Duration::minutes(2)).await, 1);
        assert_eq!(limiter.sweep_at(now + Duration::minutes(20)).await, 1);
    }
}
