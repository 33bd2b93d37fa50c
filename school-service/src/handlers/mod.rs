pub mod activity;
pub mod analytics;
pub mod auth;
pub mod branches;
pub mod events;
pub mod notifications;
pub mod organization;
pub mod posts;
pub mod profile;
pub mod users;

use crate::middleware::TenantScope;
use crate::models::NewActivity;
use crate::AppState;

/// Append to the organization's activity log. A failed write is logged, never surfaced.
pub(crate) async fn record_activity(
    state: &AppState,
    scope: &TenantScope,
    action: &'static str,
    entity_type: &'static str,
    entity_id: Option<i64>,
    branch_id: Option<i64>,
    details: serde_json::Value,
) {
    let activity = NewActivity {
        organization_id: scope.organization_id,
        user_id: scope.identity.id.clone(),
        action,
        entity_type,
        entity_id,
        details,
        branch_id,
    };
    if let Err(e) = state.stores.school.record_activity(activity).await {
        tracing::warn!(error = %e, action, entity_type, "Failed to record activity");
    }
}
