use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

use super::record_activity;
use crate::dtos::school::CreateBranchRequest;
use crate::middleware::{OrgAdmins, RequireRoles, TenantScope};
use crate::models::{Branch, BranchUpdate, NewBranch};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn list_branches(
    State(state): State<AppState>,
    scope: TenantScope,
) -> Result<Json<Vec<Branch>>, AppError> {
    let branches = state
        .stores
        .school
        .list_branches(scope.organization_id)
        .await?;
    Ok(Json(branches))
}

pub async fn get_branch(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<Json<Branch>, AppError> {
    let branch = scope.require(state.stores.school.get_branch(id).await?, "Branch")?;
    Ok(Json(branch))
}

pub async fn create_branch(
    State(state): State<AppState>,
    _admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateBranchRequest>,
) -> Result<(StatusCode, Json<Branch>), AppError> {
    let branch = state
        .stores
        .school
        .create_branch(NewBranch {
            organization_id: scope.organization_id,
            name: req.name,
            address: req.address,
            phone: req.phone,
            email: req.email,
        })
        .await?;

    record_activity(
        &state,
        &scope,
        "create",
        "branch",
        Some(branch.id),
        Some(branch.id),
        json!({ "name": branch.name }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn update_branch(
    State(state): State<AppState>,
    _admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    Path(id): Path<i64>,
    ValidatedJson(update): ValidatedJson<BranchUpdate>,
) -> Result<Json<Branch>, AppError> {
    scope.require(state.stores.school.get_branch(id).await?, "Branch")?;

    let branch = state
        .stores
        .school
        .update_branch(id, &update)
        .await?
        .ok_or(ServiceError::NotFound("Branch"))?;

    record_activity(&state, &scope, "update", "branch", Some(id), Some(id), json!({})).await;

    Ok(Json(branch))
}

pub async fn delete_branch(
    State(state): State<AppState>,
    _admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let branch = scope.require(state.stores.school.get_branch(id).await?, "Branch")?;

    if !state.stores.school.delete_branch(id).await? {
        return Err(ServiceError::NotFound("Branch").into());
    }

    record_activity(
        &state,
        &scope,
        "delete",
        "branch",
        Some(id),
        None,
        json!({ "name": branch.name }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
