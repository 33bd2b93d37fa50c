use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use super::record_activity;
use crate::middleware::{OrgAdmins, RequireRoles, TenantScope};
use crate::models::{Organization, OrganizationUpdate};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn get_organization(
    State(state): State<AppState>,
    scope: TenantScope,
) -> Result<Json<Organization>, AppError> {
    let organization = state
        .stores
        .school
        .get_organization(scope.organization_id)
        .await?
        .ok_or(ServiceError::NotFound("Organization"))?;
    Ok(Json(organization))
}

pub async fn update_organization(
    State(state): State<AppState>,
    _admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    ValidatedJson(update): ValidatedJson<OrganizationUpdate>,
) -> Result<Json<Organization>, AppError> {
    let organization = state
        .stores
        .school
        .update_organization(scope.organization_id, &update)
        .await?
        .ok_or(ServiceError::NotFound("Organization"))?;

    record_activity(
        &state,
        &scope,
        "update",
        "organization",
        Some(organization.id),
        None,
        json!({ "name": organization.name }),
    )
    .await;

    Ok(Json(organization))
}

pub async fn get_settings(
    State(state): State<AppState>,
    scope: TenantScope,
) -> Result<Json<Value>, AppError> {
    let organization = state
        .stores
        .school
        .get_organization(scope.organization_id)
        .await?
        .ok_or(ServiceError::NotFound("Organization"))?;
    Ok(Json(organization.settings))
}

/// Shallow-merge the body into the stored settings object.
pub async fn update_settings(
    State(state): State<AppState>,
    _admin: RequireRoles<OrgAdmins>,
    scope: TenantScope,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Value::Object(patch) = patch else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Settings must be a JSON object"
        )));
    };

    let organization = state
        .stores
        .school
        .get_organization(scope.organization_id)
        .await?
        .ok_or(ServiceError::NotFound("Organization"))?;

    let mut settings = match organization.settings {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let changed: Vec<String> = patch.keys().cloned().collect();
    settings.extend(patch);

    let settings = state
        .stores
        .school
        .replace_settings(scope.organization_id, Value::Object(settings))
        .await?
        .ok_or(ServiceError::NotFound("Organization"))?;

    record_activity(
        &state,
        &scope,
        "update",
        "settings",
        Some(scope.organization_id),
        None,
        json!({ "keys": changed }),
    )
    .await;

    Ok(Json(settings))
}
