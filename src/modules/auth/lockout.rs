//! Brute-force lockout as a pure state machine over a user's counters.
//!
//! Nothing here touches storage. Repositories call these transitions inside
//! their own atomic section (row lock or store mutex) so that concurrent
//! attempts against one account always see each other's writes.

use chrono::{DateTime, Duration, Utc};

use super::model::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: DateTime<Utc> },
    /// `locked_until` has passed but has not been cleared yet.
    LockExpired,
}

/// Result of recording one failed password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted { remaining: u32 },
    Locked { until: DateTime<Utc> },
}

impl LockoutPolicy {
    pub fn state(&self, user: &User, now: DateTime<Utc>) -> LockState {
        match user.locked_until {
            None => LockState::Unlocked,
            Some(until) if until > now => LockState::Locked { until },
            Some(_) => LockState::LockExpired,
        }
    }

    /// Lock-Expired -> Unlocked. Must run before any lock check so a lock
    /// that just ran out is not reported for one extra request.
    pub fn release_if_expired(&self, user: &mut User, now: DateTime<Utc>) -> bool {
        if self.state(user, now) != LockState::LockExpired {
            return false;
        }
        user.locked_until = None;
        user.failed_login_attempts = 0;
        user.updated_at = now;
        true
    }

    /// A wrong password. Attempts made while already locked are not counted,
    /// which keeps the counter bounded by `max_attempts`.
    pub fn register_failure(&self, user: &mut User, now: DateTime<Utc>) -> FailureOutcome {
        self.release_if_expired(user, now);

        if let LockState::Locked { until } = self.state(user, now) {
            return FailureOutcome::Locked { until };
        }

        user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
        user.updated_at = now;

        if user.failed_login_attempts >= self.max_attempts {
            let until = now + self.duration;
            user.locked_until = Some(until);
            FailureOutcome::Locked { until }
        } else {
            FailureOutcome::Counted {
                remaining: self.max_attempts - user.failed_login_attempts,
            }
        }
    }

    /// A correct password forgives all earlier failures.
    pub fn register_success(&self, user: &mut User, now: DateTime<Utc>) {
        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.last_login = Some(now);
        user.updated_at = now;
    }
}
