//! Progressive lockout policy.
//!
//! Counting and locking are delegated to the account store as one atomic
//! operation (`record_failed_attempt`); this module owns the surrounding
//! arithmetic: when a lock is in force, how long remains, and when the
//! spike warning fires.

use chrono::{DateTime, Duration, Utc};

use crate::model::Account;

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    threshold: u32,
    duration: Duration,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u32, duration: Duration) -> Self {
        Self {
            threshold,
            duration,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// A lock whose expiry has passed no longer counts as locked; the
    /// login path clears it on the next successful verification.
    #[must_use]
    pub fn is_locked(&self, account: &Account, now: DateTime<Utc>) -> bool {
        if !account.is_locked {
            return false;
        }
        account.locked_until.is_some_and(|until| until > now)
    }

    /// Remaining lock time in minutes, ceiling-rounded so a caller never
    /// sees "0 minutes" on an active lock.
    #[must_use]
    pub fn remaining_minutes(&self, account: &Account, now: DateTime<Utc>) -> i64 {
        let Some(until) = account.locked_until else {
            return self.duration.num_minutes();
        };
        let seconds = (until - now).num_seconds().max(0);
        (seconds + 59) / 60
    }

    /// Expiry for a lock imposed now.
    #[must_use]
    pub fn lock_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.duration
    }

    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        self.duration.num_minutes()
    }

    /// Attempt count at which the early-warning spike signal fires.
    #[must_use]
    pub fn spike_threshold(&self) -> u32 {
        self.threshold.saturating_sub(2)
    }
}
