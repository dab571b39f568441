use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier carried in identity tokens.
///
/// Roles stay opaque strings at this layer: a token may name a role this
/// process has never heard of, and that role simply resolves to no grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Platform operator. Satisfies every requirement and bypasses tenant scoping.
    pub const SUPERADMIN: Role = Role::from_static("SUPERADMIN");
    pub const ADMIN: Role = Role::from_static("ADMIN");
    pub const PASTOR: Role = Role::from_static("PASTOR");
    pub const TREASURER: Role = Role::from_static("TREASURER");
    pub const FELLOWSHIP_LEADER: Role = Role::from_static("FELLOWSHIP_LEADER");
    pub const MEMBER_MANAGER: Role = Role::from_static("MEMBER_MANAGER");
    pub const MEMBER: Role = Role::from_static("MEMBER");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single superadmin test. Everything that needs to know whether a caller
/// bypasses tenant scoping or permission checks goes through here.
pub fn is_superadmin(role: &Role) -> bool {
    role.as_str() == Role::SUPERADMIN.as_str()
}

/// `Role → set of Permission`.
///
/// Read-only once built. Roles missing from the map have an empty grant.
#[derive(Debug, Clone, Default)]
pub struct RolePermissionMap {
    grants: HashMap<Role, BTreeSet<Permission>>,
}

static STANDARD: LazyLock<RolePermissionMap> = LazyLock::new(RolePermissionMap::build_standard);

impl RolePermissionMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Process-wide default grants, built on first use.
    pub fn standard() -> &'static RolePermissionMap {
        &STANDARD
    }

    /// Replace the grant for `role`.
    pub fn with_grant(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.grants.insert(role, permissions.into_iter().collect());
        self
    }

    pub fn granted(&self, role: &Role) -> Option<&BTreeSet<Permission>> {
        self.grants.get(role)
    }

    pub fn has(&self, role: &Role, permission: Permission) -> bool {
        self.granted(role).is_some_and(|set| set.contains(&permission))
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.grants.keys()
    }

    fn build_standard() -> Self {
        use Permission::*;

        let admin = Permission::ALL
            .iter()
            .copied()
            .filter(|p| p.category() != crate::PermissionCategory::Platform);

        Self::empty()
            .with_grant(
                Role::SUPERADMIN,
                [
                    PlatformAccess,
                    AllChurchesView,
                    AllChurchesManage,
                    BillingView,
                    BillingManage,
                    SystemConfig,
                ],
            )
            .with_grant(Role::ADMIN, admin)
            .with_grant(
                Role::PASTOR,
                [
                    MemberViewAll,
                    MemberEditPastoral,
                    HouseholdView,
                    FellowshipViewAll,
                    CareNeedViewAll,
                    CareNeedCreate,
                    CareNeedEdit,
                    CareNeedAssign,
                    VisitViewAll,
                    VisitCreate,
                    VisitEdit,
                    PrayerRequestViewAll,
                    PrayerRequestCreate,
                    PrayerRequestEdit,
                    EventViewAll,
                    EventCreate,
                    EventEditAll,
                    AttendanceViewAll,
                    AttendanceRecord,
                    VisitorView,
                    VisitorManage,
                    SmsSend,
                    EmailSend,
                    ReportView,
                    ReportMember,
                    ReportAttendance,
                    ReportAnalytics,
                ],
            )
            .with_grant(
                Role::TREASURER,
                [
                    MemberViewAll,
                    DonationViewAll,
                    DonationCreate,
                    DonationEdit,
                    DonationDelete,
                    DonationExport,
                    CampaignView,
                    CampaignManage,
                    PledgeViewAll,
                    PledgeManage,
                    ReceiptIssue,
                    ReportView,
                    ReportFinancial,
                    ReportExport,
                ],
            )
            .with_grant(
                Role::FELLOWSHIP_LEADER,
                [
                    MemberViewFellowship,
                    FellowshipViewOwn,
                    FellowshipEditOwn,
                    FellowshipManageMembers,
                    AttendanceViewFellowship,
                    AttendanceRecord,
                    EventViewAll,
                    EventEditOwn,
                    SmsSendFellowship,
                    PrayerRequestCreate,
                ],
            )
            .with_grant(
                Role::MEMBER_MANAGER,
                [
                    MemberViewAll,
                    MemberCreate,
                    MemberEditAll,
                    MemberDelete,
                    MemberExport,
                    MemberImport,
                    HouseholdView,
                    HouseholdCreate,
                    HouseholdEdit,
                    HouseholdDelete,
                    FellowshipViewAll,
                    VisitorView,
                    VisitorManage,
                    ReportView,
                    ReportMember,
                ],
            )
            .with_grant(
                Role::MEMBER,
                [
                    MemberViewOwn,
                    MemberEditOwn,
                    DonationViewOwn,
                    PledgeViewOwn,
                    EventViewPublic,
                    EventRegister,
                    PrayerRequestCreate,
                ],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superadmin_predicate_matches_exact_name_only() {
        assert!(is_superadmin(&Role::SUPERADMIN));
        assert!(is_superadmin(&Role::new("SUPERADMIN".to_string())));
        assert!(!is_superadmin(&Role::new("superadmin")));
        assert!(!is_superadmin(&Role::ADMIN));
    }

    #[test]
    fn unknown_role_has_no_grant() {
        let map = RolePermissionMap::standard();
        assert!(map.granted(&Role::new("STAFF")).is_none());
        assert!(!map.has(&Role::new("STAFF"), Permission::MemberViewOwn));
    }

    #[test]
    fn admin_gets_church_permissions_but_not_platform() {
        let map = RolePermissionMap::standard();
        assert!(map.has(&Role::ADMIN, Permission::UserManageRoles));
        assert!(map.has(&Role::ADMIN, Permission::MemberCreate));
        assert!(!map.has(&Role::ADMIN, Permission::AllChurchesManage));
    }

    #[test]
    fn member_is_limited_to_own_records() {
        let map = RolePermissionMap::standard();
        assert!(map.has(&Role::MEMBER, Permission::MemberViewOwn));
        assert!(!map.has(&Role::MEMBER, Permission::MemberViewAll));
    }

    #[test]
    fn with_grant_replaces_previous_set() {
        let map = RolePermissionMap::empty()
            .with_grant(Role::new("STAFF"), [Permission::MemberViewAll])
            .with_grant(Role::new("STAFF"), [Permission::HouseholdView]);
        let granted = map.granted(&Role::new("STAFF")).unwrap();
        assert_eq!(granted.len(), 1);
        assert!(granted.contains(&Permission::HouseholdView));
    }
}
