use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::school::ProfileUpdateRequest;
use crate::middleware::CurrentIdentity;
use crate::models::Identity;
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Self-service profile edit. Role, branch, organization and activation are not reachable here.
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ValidatedJson(req): ValidatedJson<ProfileUpdateRequest>,
) -> Result<Json<Identity>, AppError> {
    let updated = state
        .stores
        .users
        .update_identity(&identity.id, &req.into())
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    tracing::info!(identity_id = %updated.id, "Profile updated");
    Ok(Json(updated))
}
