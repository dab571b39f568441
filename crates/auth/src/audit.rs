use chrono::{DateTime, Utc};

use crate::TenantViolationRecord;

/// Destination for tenant-violation records.
pub trait SecurityAuditSink: Send + Sync {
    fn record(&self, violation: &TenantViolationRecord, at: DateTime<Utc>);
}

impl<T: SecurityAuditSink + ?Sized> SecurityAuditSink for std::sync::Arc<T> {
    fn record(&self, violation: &TenantViolationRecord, at: DateTime<Utc>) {
        (**self).record(violation, at)
    }
}
