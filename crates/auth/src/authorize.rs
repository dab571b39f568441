use serde::Serialize;
use thiserror::Error;

use crate::{LogicalOperation, Permission, PermissionRequirement, Role, RolePermissionMap, is_superadmin};

/// Outcome of evaluating a requirement against a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// `missing` lists the required permissions the role does not hold.
    Deny { missing: Vec<Permission> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Authenticated caller lacks the permissions an operation requires.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct InsufficientPermission {
    pub required: Vec<Permission>,
    pub role: Role,
    pub operation: LogicalOperation,
    pub message: String,
}

/// Pure policy decision.
///
/// - SUPERADMIN is allowed regardless of its mapped grant
/// - AND: allowed iff every required permission is granted
/// - OR: allowed iff at least one required permission is granted
/// - unknown roles resolve to the empty grant
pub fn evaluate(role: &Role, requirement: &PermissionRequirement, map: &RolePermissionMap) -> Decision {
    if is_superadmin(role) {
        return Decision::Allow;
    }

    let missing: Vec<Permission> = match map.granted(role) {
        Some(granted) => requirement.permissions().difference(granted).copied().collect(),
        None => requirement.permissions().iter().copied().collect(),
    };

    let allowed = match requirement.operation() {
        LogicalOperation::And => missing.is_empty(),
        LogicalOperation::Or => missing.len() < requirement.permissions().len(),
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny { missing }
    }
}

/// Evaluate and turn a deny into an error, logging it as a security event.
pub fn check_permission(
    role: &Role,
    requirement: &PermissionRequirement,
    map: &RolePermissionMap,
) -> Result<(), InsufficientPermission> {
    match evaluate(role, requirement, map) {
        Decision::Allow => Ok(()),
        Decision::Deny { missing } => {
            let required: Vec<Permission> = requirement.permissions().iter().copied().collect();
            let message = match requirement.message() {
                Some(custom) => custom.to_string(),
                None => format!(
                    "Access denied. Role '{}' lacks required permission(s): [{}]",
                    role,
                    join_names(&required)
                ),
            };

            tracing::warn!(
                target: "security",
                role = %role,
                operation = ?requirement.operation(),
                required = %join_names(&required),
                missing = %join_names(&missing),
                "permission denied"
            );

            Err(InsufficientPermission {
                required,
                role: role.clone(),
                operation: requirement.operation(),
                message,
            })
        }
    }
}

fn join_names(perms: &[Permission]) -> String {
    perms.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
}
