//! Tenant-scoped records served by the demo routes.

use serde::{Deserialize, Serialize};

use shepherd_core::{ChurchId, HouseholdId, MemberId, TenantScoped};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub church_id: ChurchId,
    pub first_name: String,
    pub last_name: String,
    pub household_id: Option<HouseholdId>,
}

impl TenantScoped for Member {
    fn church_id(&self) -> ChurchId {
        self.church_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    pub id: HouseholdId,
    pub church_id: ChurchId,
    pub name: String,
}

impl TenantScoped for Household {
    fn church_id(&self) -> ChurchId {
        self.church_id
    }
}
