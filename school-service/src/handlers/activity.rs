use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::school::ActivityQuery;
use crate::middleware::TenantScope;
use crate::models::ActivityLog;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub async fn list_activity(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityLog>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let logs = state
        .stores
        .school
        .list_activity(scope.organization_id, query.branch_id, limit)
        .await?;
    Ok(Json(logs))
}
