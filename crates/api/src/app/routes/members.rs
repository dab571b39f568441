use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use shepherd_auth::{Permission, PermissionRequirement, RolePermissionMap};
use shepherd_core::{DomainError, MemberId};
use shepherd_infra::{Household, Member, TenantSession, TenantStore};

use crate::app::{dto, errors, services::AppServices};
use crate::authz::require;
use crate::context;

pub fn router(permissions: &Arc<RolePermissionMap>) -> Router {
    Router::new()
        .route(
            "/",
            require(
                get(list_members),
                PermissionRequirement::any_of([Permission::MemberViewAll, Permission::MemberViewFellowship]),
                permissions,
            )
            .merge(require(
                post(create_member),
                PermissionRequirement::any_of([Permission::MemberCreate]),
                permissions,
            )),
        )
        .route(
            "/:id",
            require(
                get(get_member),
                PermissionRequirement::any_of([Permission::MemberViewAll]),
                permissions,
            ),
        )
        .route(
            "/:id/household",
            require(
                get(get_member_household),
                PermissionRequirement::all_of([Permission::MemberViewAll, Permission::HouseholdView]),
                permissions,
            ),
        )
}

pub async fn list_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<TenantSession>,
) -> axum::response::Response {
    let members: Vec<Member> = session.list(&*services.members);
    let items = members
        .iter()
        .map(dto::member_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn create_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<TenantSession>,
    Json(body): Json<dto::CreateMemberRequest>,
) -> axum::response::Response {
    let ctx = match context::require_context() {
        Ok(ctx) => ctx,
        Err(err) => return errors::access_error_to_response(err),
    };

    let Some(church_id) = ctx.church_id.or(body.church_id) else {
        return errors::domain_error_to_response(DomainError::validation("church_id is required"));
    };
    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return errors::domain_error_to_response(DomainError::validation("first_name and last_name are required"));
    }

    if let Some(household_id) = body.household_id {
        let household: Option<Household> = session.get(&*services.households, &household_id);
        if household.is_none_or(|h| h.church_id != church_id) {
            return errors::domain_error_to_response(DomainError::validation("household not found"));
        }
    }

    let member = Member {
        id: services.next_member_id(),
        church_id,
        first_name: body.first_name.trim().to_string(),
        last_name: body.last_name.trim().to_string(),
        household_id: body.household_id,
    };

    if let Err(err) = session.insert(&*services.members, member.id, member.clone()) {
        return errors::access_error_to_response(err.into());
    }

    tracing::info!(member_id = %member.id, church_id = %member.church_id, "member created");
    (StatusCode::CREATED, Json(dto::member_to_json(&member))).into_response()
}

pub async fn get_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<TenantSession>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let member: Option<Member> = session.get(&*services.members, &MemberId::new(id));
    let Some(member) = member else {
        return errors::domain_error_to_response(DomainError::not_found());
    };

    if let Err(err) = context::verify_ownership(member.church_id, "Member") {
        return errors::access_error_to_response(err);
    }

    (StatusCode::OK, Json(dto::member_to_json(&member))).into_response()
}

/// Follows the member's household link. The link is resolved by id without
/// the session predicate, so the ownership check is what keeps a corrupted
/// cross-church link from leaking the other church's household.
pub async fn get_member_household(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<TenantSession>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let member: Option<Member> = session.get(&*services.members, &MemberId::new(id));
    let Some(member) = member else {
        return errors::domain_error_to_response(DomainError::not_found());
    };
    if let Err(err) = context::verify_ownership(member.church_id, "Member") {
        return errors::access_error_to_response(err);
    }

    let household: Option<Household> = member
        .household_id
        .and_then(|hid| services.households.get(None, &hid));
    let Some(household) = household else {
        return errors::domain_error_to_response(DomainError::not_found());
    };

    if let Err(err) = context::verify_ownership(household.church_id, "Household") {
        return errors::access_error_to_response(err);
    }

    (StatusCode::OK, Json(dto::household_to_json(&household))).into_response()
}
