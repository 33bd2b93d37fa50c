//! Organization user administration. Deletion is a soft deactivation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

use super::record_activity;
use crate::dtos::school::{BranchFilter, CreateUserRequest, UpdateUserRequest};
use crate::middleware::{OrgAdmins, RequireRoles, TenantScope};
use crate::models::{Identity, IdentityUpdate, Role};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<BranchFilter>,
) -> Result<Json<Vec<Identity>>, AppError> {
    let users = state
        .stores
        .users
        .list_identities(scope.organization_id, filter.branch_id)
        .await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<Identity>), AppError> {
    ensure_may_grant(admin.identity(), Some(req.role))?;
    if let Some(branch_id) = req.branch_id {
        scope.require(state.stores.school.get_branch(branch_id).await?, "Branch")?;
    }

    let mut identity = Identity::new(
        format!("user_{}", uuid::Uuid::new_v4().simple()),
        req.email,
        req.role,
    )
    .with_names(req.first_name, req.last_name)
    .in_organization(Some(scope.organization_id));
    identity.branch_id = req.branch_id;
    identity.language = req.language;

    if !state.stores.users.insert_identity(&identity).await? {
        return Err(ServiceError::Conflict("Email already in use".to_string()).into());
    }

    record_activity(
        &state,
        &scope,
        "create",
        "user",
        None,
        identity.branch_id,
        json!({ "userId": identity.id, "role": identity.role.as_str() }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(identity)))
}

pub async fn update_user(
    State(state): State<AppState>,
    admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<Identity>, AppError> {
    let target = scope.require(state.stores.users.get_identity(&id).await?, "User")?;
    let update: IdentityUpdate = req.into();

    ensure_may_grant(admin.identity(), update.role)?;
    // Owners are only managed by owners.
    if target.role == Role::Owner {
        ensure_may_grant(admin.identity(), Some(Role::Owner))?;
    }
    if let Some(branch_id) = update.branch_id {
        scope.require(state.stores.school.get_branch(branch_id).await?, "Branch")?;
    }

    let updated = state
        .stores
        .users
        .update_identity(&id, &update)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    if update.revokes_sessions() {
        state.sessions.revoke_all(&id).await?;
    }

    record_activity(
        &state,
        &scope,
        "update",
        "user",
        None,
        updated.branch_id,
        json!({ "userId": updated.id, "role": updated.role.as_str(), "isActive": updated.is_active }),
    )
    .await;

    Ok(Json(updated))
}

/// Deactivate the user and end their sessions. The record itself is kept.
pub async fn deactivate_user(
    State(state): State<AppState>,
    admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let target = scope.require(state.stores.users.get_identity(&id).await?, "User")?;
    if target.role == Role::Owner {
        ensure_may_grant(admin.identity(), Some(Role::Owner))?;
    }

    let update = IdentityUpdate {
        is_active: Some(false),
        ..Default::default()
    };
    state
        .stores
        .users
        .update_identity(&id, &update)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;
    state.sessions.revoke_all(&id).await?;

    record_activity(
        &state,
        &scope,
        "deactivate",
        "user",
        None,
        target.branch_id,
        json!({ "userId": id }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Only owners may hand out or take away the owner role.
fn ensure_may_grant(actor: &Identity, role: Option<Role>) -> Result<(), AppError> {
    if role == Some(Role::Owner) && actor.role != Role::Owner {
        return Err(AppError::Forbidden(anyhow::anyhow!("Insufficient permissions")));
    }
    Ok(())
}
