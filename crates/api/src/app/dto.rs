use serde::{Deserialize, Serialize};
use serde_json::json;

use shepherd_core::{ChurchId, HouseholdId, UserId};
use shepherd_infra::{Household, Member};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub first_name: String,
    pub last_name: String,
    pub household_id: Option<HouseholdId>,
    /// Only read for unscoped (superadmin) callers.
    pub church_id: Option<ChurchId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user_id: UserId,
    pub church_id: Option<ChurchId>,
    pub role: String,
}

pub fn member_to_json(m: &Member) -> serde_json::Value {
    json!({
        "id": m.id,
        "church_id": m.church_id,
        "first_name": m.first_name,
        "last_name": m.last_name,
        "household_id": m.household_id,
    })
}

pub fn household_to_json(h: &Household) -> serde_json::Value {
    json!({
        "id": h.id,
        "church_id": h.church_id,
        "name": h.name,
    })
}
