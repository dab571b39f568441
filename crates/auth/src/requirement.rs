use std::collections::BTreeSet;

use serde::Serialize;
use shepherd_core::{DomainError, DomainResult};

use crate::Permission;

/// How the permissions of a requirement combine.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperation {
    /// Caller must hold every listed permission.
    And,
    /// Caller must hold at least one listed permission.
    #[default]
    Or,
}

/// Permission requirement attached to a protected operation at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRequirement {
    permissions: BTreeSet<Permission>,
    operation: LogicalOperation,
    message: Option<String>,
}

impl PermissionRequirement {
    /// Build from an arbitrary set. Empty sets are rejected.
    pub fn new(
        permissions: impl IntoIterator<Item = Permission>,
        operation: LogicalOperation,
    ) -> DomainResult<Self> {
        let permissions: BTreeSet<Permission> = permissions.into_iter().collect();
        if permissions.is_empty() {
            return Err(DomainError::validation(
                "permission requirement must name at least one permission",
            ));
        }
        Ok(Self {
            permissions,
            operation,
            message: None,
        })
    }

    /// OR requirement over a non-empty literal list.
    pub fn any_of<const N: usize>(permissions: [Permission; N]) -> Self {
        const { assert!(N > 0, "requirement needs at least one permission") };
        Self {
            permissions: permissions.into_iter().collect(),
            operation: LogicalOperation::Or,
            message: None,
        }
    }

    /// AND requirement over a non-empty literal list.
    pub fn all_of<const N: usize>(permissions: [Permission; N]) -> Self {
        const { assert!(N > 0, "requirement needs at least one permission") };
        Self {
            permissions: permissions.into_iter().collect(),
            operation: LogicalOperation::And,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn operation(&self) -> LogicalOperation {
        self.operation
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requirement_is_rejected() {
        let err = PermissionRequirement::new([], LogicalOperation::And).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn default_operation_is_or() {
        assert_eq!(LogicalOperation::default(), LogicalOperation::Or);
        let req = PermissionRequirement::any_of([Permission::MemberViewAll]);
        assert_eq!(req.operation(), LogicalOperation::Or);
    }

    #[test]
    fn duplicates_collapse() {
        let req = PermissionRequirement::all_of([
            Permission::MemberViewAll,
            Permission::MemberViewAll,
            Permission::HouseholdView,
        ]);
        assert_eq!(req.permissions().len(), 2);
        assert_eq!(req.message(), None);
        assert_eq!(
            req.with_message("members only").message(),
            Some("members only")
        );
    }
}
