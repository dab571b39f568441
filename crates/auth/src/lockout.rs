use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{AccessError, AuthenticationFailed};

/// Failed-login bookkeeping for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginAttemptRecord {
    pub identity_key: String,
    pub failed_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Credential checks admitted but not yet settled.
    pub in_flight: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl LoginAttemptRecord {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            failed_count: 0,
            locked_until: None,
            in_flight: 0,
            last_attempt_at: None,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Nothing worth keeping: no failures, no lock, nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.failed_count == 0 && self.locked_until.is_none() && self.in_flight == 0
    }

    fn clear(&mut self) {
        self.failed_count = 0;
        self.locked_until = None;
    }
}

/// Persistence for [`LoginAttemptRecord`]s.
///
/// `update` must apply the closure while holding an exclusive lock for that
/// identity so concurrent failures are never lost.
pub trait LoginAttemptStore: Send + Sync {
    fn get(&self, identity_key: &str) -> Option<LoginAttemptRecord>;

    fn get_or_create(&self, identity_key: &str) -> LoginAttemptRecord;

    /// Apply `f` atomically and return the record as left by `f`.
    fn update(
        &self,
        identity_key: &str,
        f: &mut dyn FnMut(&mut LoginAttemptRecord),
    ) -> LoginAttemptRecord;

    /// Clear failures and lock; drop the record once nothing is in flight.
    fn reset(&self, identity_key: &str);

    /// Drop the record if `idle` holds for it, atomically with respect to `update`.
    fn remove_if(&self, identity_key: &str, idle: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> bool;

    /// Drop every record for which `keep` is false. Returns how many went.
    fn prune(&self, keep: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> usize;
}

impl<S: LoginAttemptStore + ?Sized> LoginAttemptStore for std::sync::Arc<S> {
    fn get(&self, identity_key: &str) -> Option<LoginAttemptRecord> {
        (**self).get(identity_key)
    }

    fn get_or_create(&self, identity_key: &str) -> LoginAttemptRecord {
        (**self).get_or_create(identity_key)
    }

    fn update(
        &self,
        identity_key: &str,
        f: &mut dyn FnMut(&mut LoginAttemptRecord),
    ) -> LoginAttemptRecord {
        (**self).update(identity_key, f)
    }

    fn reset(&self, identity_key: &str) {
        (**self).reset(identity_key)
    }

    fn remove_if(&self, identity_key: &str, idle: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> bool {
        (**self).remove_if(identity_key, idle)
    }

    fn prune(&self, keep: &mut dyn FnMut(&LoginAttemptRecord) -> bool) -> usize {
        (**self).prune(keep)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lock_duration: Duration,
    /// Unlocked records with no attempt for this long are pruned.
    pub idle_retention: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lock_duration: Duration::minutes(15),
            idle_retention: Duration::days(30),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("account locked until {locked_until}")]
pub struct AccountLocked {
    pub locked_until: DateTime<Utc>,
}

impl AccountLocked {
    /// Whole seconds until the lock lifts, rounded up, never below 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.locked_until - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Too many attempts in progress or in the current window.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("too many login attempts; retry in {retry_after_secs}s")]
pub struct RateLimited {
    pub retry_after_secs: u64,
}

/// Result of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_count: u32,
}

impl LockoutStatus {
    fn of(record: &LoginAttemptRecord, now: DateTime<Utc>) -> Self {
        Self {
            locked: record.is_locked_at(now),
            locked_until: record.locked_until,
            failed_count: record.failed_count,
        }
    }
}

enum Admission {
    Admitted,
    Locked(DateTime<Utc>),
    Saturated,
}

/// Per-identity brute-force throttle.
///
/// Expired locks are cleared lazily by the next `check` or failure; there is
/// no background sweep. Records are dropped on success, on expiry, and by
/// [`LockoutGuard::prune`].
#[derive(Debug, Clone)]
pub struct LockoutGuard<S> {
    store: S,
    policy: LockoutPolicy,
}

impl<S: LoginAttemptStore> LockoutGuard<S> {
    pub fn new(store: S, policy: LockoutPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn normalize_key(identity_key: &str) -> String {
        identity_key.trim().to_lowercase()
    }

    /// Reject while locked; reset an expired lock.
    pub fn check(&self, identity_key: &str, now: DateTime<Utc>) -> Result<(), AccountLocked> {
        let key = Self::normalize_key(identity_key);
        let Some(record) = self.store.get(&key) else {
            return Ok(());
        };
        let Some(locked_until) = record.locked_until else {
            return Ok(());
        };

        if now < locked_until {
            return Err(AccountLocked { locked_until });
        }

        let record = self.store.update(&key, &mut |r: &mut LoginAttemptRecord| {
            if r.locked_until.is_some_and(|until| now >= until) {
                r.clear();
            }
        });
        match record.locked_until {
            // Re-locked by a concurrent failure between the read and the update.
            Some(locked_until) if now < locked_until => Err(AccountLocked { locked_until }),
            _ => {
                tracing::info!(target: "security", identity = %key, "account lock expired");
                self.store.remove_if(&key, &mut |r: &LoginAttemptRecord| r.is_idle());
                Ok(())
            }
        }
    }

    pub fn record_failed_login(&self, identity_key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let key = Self::normalize_key(identity_key);
        let policy = self.policy;
        let mut newly_locked = false;

        let record = self.store.update(&key, &mut |r: &mut LoginAttemptRecord| {
            newly_locked = apply_failure(r, now, policy);
        });
        self.log_failure(&key, &record, newly_locked);
        LockoutStatus::of(&record, now)
    }

    pub fn record_success(&self, identity_key: &str) {
        self.store.reset(&Self::normalize_key(identity_key));
    }

    /// Drop records that are unlocked, idle in flight and older than the
    /// retention window.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.policy.idle_retention;
        let removed = self.store.prune(&mut |r: &LoginAttemptRecord| {
            r.in_flight > 0 || r.is_locked_at(now) || r.last_attempt_at.is_some_and(|at| at > cutoff)
        });
        if removed > 0 {
            tracing::debug!(removed, "pruned stale login-attempt records");
        }
        removed
    }

    /// Run a credential check behind the lockout.
    ///
    /// The attempt is admitted under the identity's lock before `verify` runs,
    /// and at most `max_failed_attempts` checks can be outstanding or failed
    /// at once, so concurrent guesses cannot get past the threshold. While
    /// locked, `verify` is never called.
    pub fn authenticate<F>(&self, identity_key: &str, now: DateTime<Utc>, verify: F) -> Result<(), AccessError>
    where
        F: FnOnce() -> bool,
    {
        let key = Self::normalize_key(identity_key);
        let policy = self.policy;
        let mut admission = Admission::Saturated;
        let mut expired = false;

        self.store.update(&key, &mut |r: &mut LoginAttemptRecord| {
            if let Some(until) = r.locked_until {
                if now < until {
                    admission = Admission::Locked(until);
                    return;
                }
                r.clear();
                expired = true;
            }
            if r.failed_count + r.in_flight >= policy.max_failed_attempts {
                admission = Admission::Saturated;
                return;
            }
            r.in_flight += 1;
            r.last_attempt_at = Some(now);
            admission = Admission::Admitted;
        });
        if expired {
            tracing::info!(target: "security", identity = %key, "account lock expired");
        }

        match admission {
            Admission::Admitted => {}
            Admission::Locked(locked_until) => return Err(AccountLocked { locked_until }.into()),
            Admission::Saturated => {
                tracing::warn!(target: "security", identity = %key, "login refused: attempts already in flight");
                return Err(RateLimited { retry_after_secs: 1 }.into());
            }
        }

        let mut permit = AttemptPermit { guard: self, key: &key, settled: false };
        if verify() {
            permit.settle(|r| r.in_flight = r.in_flight.saturating_sub(1));
            self.store.reset(&key);
            return Ok(());
        }

        let mut newly_locked = false;
        let record = permit.settle(|r| {
            r.in_flight = r.in_flight.saturating_sub(1);
            newly_locked = apply_failure(r, now, policy);
        });
        self.log_failure(&key, &record, newly_locked);

        match record.locked_until {
            Some(locked_until) if record.is_locked_at(now) => Err(AccountLocked { locked_until }.into()),
            _ => Err(AuthenticationFailed::InvalidCredentials.into()),
        }
    }

    fn log_failure(&self, key: &str, record: &LoginAttemptRecord, newly_locked: bool) {
        if newly_locked {
            tracing::warn!(
                target: "security",
                identity = %key,
                failed_count = record.failed_count,
                locked_until = ?record.locked_until,
                "account locked after repeated failed logins"
            );
        } else {
            tracing::debug!(identity = %key, failed_count = record.failed_count, "failed login recorded");
        }
    }
}

/// Returns true when this failure locked the account.
fn apply_failure(r: &mut LoginAttemptRecord, now: DateTime<Utc>, policy: LockoutPolicy) -> bool {
    if let Some(until) = r.locked_until {
        if now < until {
            return false;
        }
        r.clear();
    }
    r.failed_count += 1;
    r.last_attempt_at = Some(now);
    if r.failed_count >= policy.max_failed_attempts {
        r.locked_until = Some(now + policy.lock_duration);
        return true;
    }
    false
}

/// An admitted credential check. Releases its slot if dropped unsettled
/// (for example when `verify` panics).
struct AttemptPermit<'a, S: LoginAttemptStore> {
    guard: &'a LockoutGuard<S>,
    key: &'a str,
    settled: bool,
}

impl<S: LoginAttemptStore> AttemptPermit<'_, S> {
    fn settle(&mut self, mut f: impl FnMut(&mut LoginAttemptRecord)) -> LoginAttemptRecord {
        self.settled = true;
        self.guard.store.update(self.key, &mut |r: &mut LoginAttemptRecord| f(r))
    }
}

impl<S: LoginAttemptStore> Drop for AttemptPermit<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            self.guard.store.update(self.key, &mut |r: &mut LoginAttemptRecord| {
                r.in_flight = r.in_flight.saturating_sub(1);
            });
        }
    }
}
