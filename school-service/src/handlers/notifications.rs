use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::middleware::{TenantError, TenantScope};
use crate::models::Notification;
use crate::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    scope: TenantScope,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = state
        .stores
        .school
        .list_notifications(&scope.identity.id)
        .await?
        .into_iter()
        .filter(|n| n.organization_id == scope.organization_id)
        .collect();
    Ok(Json(notifications))
}

/// Only the recipient may mark a notification read.
pub async fn mark_read(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let notification = scope.require(
        state.stores.school.get_notification(id).await?,
        "Notification",
    )?;
    if notification.user_id != scope.identity.id {
        return Err(TenantError::AccessDenied.into());
    }

    state.stores.school.mark_notification_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
