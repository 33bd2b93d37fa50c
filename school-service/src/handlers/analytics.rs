use axum::{extract::State, Json};
use chrono::Utc;
use service_core::error::AppError;

use crate::middleware::TenantScope;
use crate::models::{AnalyticsOverview, EventStats, SocialStats, UserStats};
use crate::AppState;

/// Simple counts over the caller's organization.
pub async fn overview(
    State(state): State<AppState>,
    scope: TenantScope,
) -> Result<Json<AnalyticsOverview>, AppError> {
    let org = scope.organization_id;
    let events = state.stores.school.list_events(org, None).await?;
    let posts = state.stores.school.list_posts(org, None).await?;
    let users = state.stores.users.list_identities(org, None).await?;

    let now = Utc::now();
    Ok(Json(AnalyticsOverview {
        events: EventStats::from_events(&events, now.date_naive()),
        social: SocialStats::from_posts(&posts, now),
        users: UserStats::from_identities(&users),
    }))
}
