use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Grouping used for display and audit listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionCategory {
    Member,
    Household,
    Fellowship,
    Financial,
    Event,
    Attendance,
    Visitor,
    PastoralCare,
    Communication,
    Report,
    Admin,
    Platform,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

macro_rules! permission_catalog {
    ($($variant:ident => $name:literal, $category:ident;)+) => {
        /// Capability tag checked against a role's grants.
        ///
        /// The catalog is closed: tokens and requirements can only name
        /// permissions listed here.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum Permission {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl Permission {
            /// Every permission in declaration order.
            pub const ALL: &'static [Permission] = &[$(Permission::$variant,)+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Permission::$variant => $name,)+
                }
            }

            pub const fn category(self) -> PermissionCategory {
                match self {
                    $(Permission::$variant => PermissionCategory::$category,)+
                }
            }
        }
    };
}

permission_catalog! {
    MemberViewAll => "MEMBER_VIEW_ALL", Member;
    MemberViewOwn => "MEMBER_VIEW_OWN", Member;
    MemberViewFellowship => "MEMBER_VIEW_FELLOWSHIP", Member;
    MemberCreate => "MEMBER_CREATE", Member;
    MemberEditAll => "MEMBER_EDIT_ALL", Member;
    MemberEditOwn => "MEMBER_EDIT_OWN", Member;
    MemberEditPastoral => "MEMBER_EDIT_PASTORAL", Member;
    MemberDelete => "MEMBER_DELETE", Member;
    MemberExport => "MEMBER_EXPORT", Member;
    MemberImport => "MEMBER_IMPORT", Member;

    HouseholdView => "HOUSEHOLD_VIEW", Household;
    HouseholdCreate => "HOUSEHOLD_CREATE", Household;
    HouseholdEdit => "HOUSEHOLD_EDIT", Household;
    HouseholdDelete => "HOUSEHOLD_DELETE", Household;

    FellowshipViewAll => "FELLOWSHIP_VIEW_ALL", Fellowship;
    FellowshipViewOwn => "FELLOWSHIP_VIEW_OWN", Fellowship;
    FellowshipCreate => "FELLOWSHIP_CREATE", Fellowship;
    FellowshipEditAll => "FELLOWSHIP_EDIT_ALL", Fellowship;
    FellowshipEditOwn => "FELLOWSHIP_EDIT_OWN", Fellowship;
    FellowshipDelete => "FELLOWSHIP_DELETE", Fellowship;
    FellowshipManageMembers => "FELLOWSHIP_MANAGE_MEMBERS", Fellowship;

    DonationViewAll => "DONATION_VIEW_ALL", Financial;
    DonationViewOwn => "DONATION_VIEW_OWN", Financial;
    DonationCreate => "DONATION_CREATE", Financial;
    DonationEdit => "DONATION_EDIT", Financial;
    DonationDelete => "DONATION_DELETE", Financial;
    DonationExport => "DONATION_EXPORT", Financial;
    CampaignView => "CAMPAIGN_VIEW", Financial;
    CampaignManage => "CAMPAIGN_MANAGE", Financial;
    PledgeViewAll => "PLEDGE_VIEW_ALL", Financial;
    PledgeViewOwn => "PLEDGE_VIEW_OWN", Financial;
    PledgeManage => "PLEDGE_MANAGE", Financial;
    ReceiptIssue => "RECEIPT_ISSUE", Financial;

    EventViewAll => "EVENT_VIEW_ALL", Event;
    EventViewPublic => "EVENT_VIEW_PUBLIC", Event;
    EventCreate => "EVENT_CREATE", Event;
    EventEditAll => "EVENT_EDIT_ALL", Event;
    EventEditOwn => "EVENT_EDIT_OWN", Event;
    EventDelete => "EVENT_DELETE", Event;
    EventRegister => "EVENT_REGISTER", Event;
    EventManageRegistrations => "EVENT_MANAGE_REGISTRATIONS", Event;

    AttendanceViewAll => "ATTENDANCE_VIEW_ALL", Attendance;
    AttendanceViewFellowship => "ATTENDANCE_VIEW_FELLOWSHIP", Attendance;
    AttendanceRecord => "ATTENDANCE_RECORD", Attendance;
    AttendanceEdit => "ATTENDANCE_EDIT", Attendance;

    VisitorView => "VISITOR_VIEW", Visitor;
    VisitorManage => "VISITOR_MANAGE", Visitor;

    CareNeedViewAll => "CARE_NEED_VIEW_ALL", PastoralCare;
    CareNeedViewAssigned => "CARE_NEED_VIEW_ASSIGNED", PastoralCare;
    CareNeedCreate => "CARE_NEED_CREATE", PastoralCare;
    CareNeedEdit => "CARE_NEED_EDIT", PastoralCare;
    CareNeedAssign => "CARE_NEED_ASSIGN", PastoralCare;
    VisitViewAll => "VISIT_VIEW_ALL", PastoralCare;
    VisitCreate => "VISIT_CREATE", PastoralCare;
    VisitEdit => "VISIT_EDIT", PastoralCare;
    PrayerRequestViewAll => "PRAYER_REQUEST_VIEW_ALL", PastoralCare;
    PrayerRequestCreate => "PRAYER_REQUEST_CREATE", PastoralCare;
    PrayerRequestEdit => "PRAYER_REQUEST_EDIT", PastoralCare;

    SmsSend => "SMS_SEND", Communication;
    SmsSendFellowship => "SMS_SEND_FELLOWSHIP", Communication;
    EmailSend => "EMAIL_SEND", Communication;
    BulkMessageSend => "BULK_MESSAGE_SEND", Communication;

    ReportView => "REPORT_VIEW", Report;
    ReportGenerate => "REPORT_GENERATE", Report;
    ReportMember => "REPORT_MEMBER", Report;
    ReportFinancial => "REPORT_FINANCIAL", Report;
    ReportAttendance => "REPORT_ATTENDANCE", Report;
    ReportAnalytics => "REPORT_ANALYTICS", Report;
    ReportExport => "REPORT_EXPORT", Report;

    UserView => "USER_VIEW", Admin;
    UserCreate => "USER_CREATE", Admin;
    UserEdit => "USER_EDIT", Admin;
    UserDelete => "USER_DELETE", Admin;
    UserManageRoles => "USER_MANAGE_ROLES", Admin;
    ChurchSettingsView => "CHURCH_SETTINGS_VIEW", Admin;
    ChurchSettingsEdit => "CHURCH_SETTINGS_EDIT", Admin;
    SubscriptionView => "SUBSCRIPTION_VIEW", Admin;
    SubscriptionManage => "SUBSCRIPTION_MANAGE", Admin;

    PlatformAccess => "PLATFORM_ACCESS", Platform;
    AllChurchesView => "ALL_CHURCHES_VIEW", Platform;
    AllChurchesManage => "ALL_CHURCHES_MANAGE", Platform;
    BillingView => "BILLING_VIEW", Platform;
    BillingManage => "BILLING_MANAGE", Platform;
    SystemConfig => "SYSTEM_CONFIG", Platform;
}

impl Permission {
    /// Read-only capability (name contains `_VIEW`).
    pub fn is_view(self) -> bool {
        self.as_str().contains("_VIEW")
    }

    /// Mutating capability (create/edit/delete/manage).
    pub fn is_management(self) -> bool {
        let name = self.as_str();
        ["_CREATE", "_EDIT", "_DELETE", "_MANAGE"]
            .iter()
            .any(|marker| name.contains(marker))
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPermission(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = Permission::ALL.iter().map(|p| p.as_str()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn parses_every_catalog_name() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), *p);
        }
        assert_eq!("member_create".parse::<Permission>().unwrap(), Permission::MemberCreate);
        assert!("MEMBER_TELEPORT".parse::<Permission>().is_err());
    }

    #[test]
    fn serde_uses_catalog_name() {
        let json = serde_json::to_string(&Permission::HouseholdView).unwrap();
        assert_eq!(json, "\"HOUSEHOLD_VIEW\"");
        let back: Permission = serde_json::from_str("\"SMS_SEND\"").unwrap();
        assert_eq!(back, Permission::SmsSend);
    }

    #[test]
    fn classifies_view_and_management() {
        assert!(Permission::MemberViewAll.is_view());
        assert!(!Permission::MemberViewAll.is_management());
        assert!(Permission::CampaignManage.is_management());
        assert_eq!(Permission::ReceiptIssue.category(), PermissionCategory::Financial);
    }
}
