//! In-memory security audit log for tenant violations.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use shepherd_auth::{SecurityAuditSink, TenantViolationRecord};
use shepherd_core::{ChurchId, UserId};

/// Violations per user within [`ALERT_WINDOW_HOURS`] that raise an alert.
pub const ALERT_THRESHOLD: usize = 5;
pub const ALERT_WINDOW_HOURS: i64 = 24;

/// Entries older than this are dropped.
pub const RETENTION_DAYS: i64 = 30;
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditedViolation {
    pub record: TenantViolationRecord,
    pub at: DateTime<Utc>,
}

/// Bounded by age ([`RETENTION_DAYS`]) and by count; the oldest entries go first.
#[derive(Debug)]
pub struct InMemorySecurityAudit {
    entries: RwLock<VecDeque<AuditedViolation>>,
    max_entries: usize,
}

impl Default for InMemorySecurityAudit {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl InMemorySecurityAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Drop entries past retention. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        let cutoff = now - Duration::days(RETENTION_DAYS);
        entries.retain(|e| e.at > cutoff);
        before - entries.len()
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<AuditedViolation>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn for_user(&self, user_id: UserId) -> Vec<AuditedViolation> {
        self.filtered(|e| e.record.user_id == user_id)
    }

    /// Violations against resources of `church_id`.
    pub fn for_church(&self, church_id: ChurchId) -> Vec<AuditedViolation> {
        self.filtered(|e| e.record.actual_church_id == church_id)
    }

    pub fn recent_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> usize {
        let since = now - Duration::hours(ALERT_WINDOW_HOURS);
        self.filtered(|e| e.record.user_id == user_id && e.at > since).len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(&self, keep: impl Fn(&AuditedViolation) -> bool) -> Vec<AuditedViolation> {
        match self.entries.read() {
            Ok(entries) => entries.iter().filter(|e| keep(e)).cloned().collect(),
            Err(_) => vec![],
        }
    }
}

impl SecurityAuditSink for InMemorySecurityAudit {
    fn record(&self, violation: &TenantViolationRecord, at: DateTime<Utc>) {
        {
            let mut entries = self.write();
            entries.push_back(AuditedViolation {
                record: violation.clone(),
                at,
            });
            let cutoff = at - Duration::days(RETENTION_DAYS);
            while entries.front().is_some_and(|e| e.at <= cutoff) || entries.len() > self.max_entries {
                entries.pop_front();
            }
        }

        let recent = self.recent_for_user(violation.user_id, at);
        if recent >= ALERT_THRESHOLD {
            tracing::warn!(
                target: "security",
                user_id = %violation.user_id,
                violations_24h = recent,
                "repeated tenant violations by one user"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(user: i64, actual: i64) -> TenantViolationRecord {
        TenantViolationRecord {
            user_id: UserId::new(user),
            attempted_church_id: Some(ChurchId::new(1)),
            actual_church_id: ChurchId::new(actual),
            resource_type: "Member".into(),
        }
    }

    #[test]
    fn queries_by_user_and_church() {
        let audit = InMemorySecurityAudit::new();
        let now = Utc::now();
        audit.record(&violation(4, 7), now);
        audit.record(&violation(4, 9), now);
        audit.record(&violation(5, 7), now);

        assert_eq!(audit.for_user(UserId::new(4)).len(), 2);
        assert_eq!(audit.for_church(ChurchId::new(7)).len(), 2);
        assert_eq!(audit.len(), 3);
    }

    #[test]
    fn window_excludes_old_entries() {
        let audit = InMemorySecurityAudit::new();
        let now = Utc::now();
        audit.record(&violation(4, 7), now - Duration::hours(30));
        for _ in 0..ALERT_THRESHOLD {
            audit.record(&violation(4, 7), now);
        }
        assert_eq!(audit.recent_for_user(UserId::new(4), now), ALERT_THRESHOLD);
    }

    #[test]
    fn log_is_bounded_by_count_and_age() {
        let audit = InMemorySecurityAudit::with_max_entries(10);
        let now = Utc::now();
        for i in 0..25 {
            audit.record(&violation(i, 7), now);
        }
        assert_eq!(audit.len(), 10);
        assert!(audit.for_user(UserId::new(0)).is_empty());
        assert_eq!(audit.for_user(UserId::new(24)).len(), 1);

        let later = now + Duration::days(RETENTION_DAYS + 1);
        audit.record(&violation(99, 7), later);
        assert_eq!(audit.len(), 1);

        assert_eq!(audit.prune(later + Duration::days(RETENTION_DAYS + 1)), 1);
        assert!(audit.is_empty());
    }
}
