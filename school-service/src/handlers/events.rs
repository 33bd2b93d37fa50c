use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

use super::record_activity;
use crate::dtos::school::{BranchFilter, CreateEventRequest, RsvpRequest};
use crate::middleware::TenantScope;
use crate::models::{Event, EventUpdate, NewEvent, Rsvp, RsvpStatus};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn list_events(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<BranchFilter>,
) -> Result<Json<Vec<Event>>, AppError> {
    let events = state
        .stores
        .school
        .list_events(scope.organization_id, filter.branch_id)
        .await?;
    Ok(Json(events))
}

pub async fn get_event(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<Json<Event>, AppError> {
    let event = scope.require(state.stores.school.get_event(id).await?, "Event")?;
    Ok(Json(event))
}

pub async fn create_event(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    scope.require(state.stores.school.get_branch(req.branch_id).await?, "Branch")?;

    let event = state
        .stores
        .school
        .create_event(NewEvent {
            organization_id: scope.organization_id,
            branch_id: req.branch_id,
            title: req.title,
            description: req.description,
            start_date: req.start_date,
            start_time: req.start_time,
            end_date: req.end_date,
            end_time: req.end_time,
            location: req.location,
            category: req.category,
            created_by: scope.identity.id.clone(),
            max_attendees: req.max_attendees,
            requires_rsvp: req.requires_rsvp,
        })
        .await?;

    record_activity(
        &state,
        &scope,
        "create",
        "event",
        Some(event.id),
        Some(event.branch_id),
        json!({ "title": event.title }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
    ValidatedJson(update): ValidatedJson<EventUpdate>,
) -> Result<Json<Event>, AppError> {
    scope.require(state.stores.school.get_event(id).await?, "Event")?;
    if let Some(branch_id) = update.branch_id {
        scope.require(state.stores.school.get_branch(branch_id).await?, "Branch")?;
    }

    let event = state
        .stores
        .school
        .update_event(id, &update)
        .await?
        .ok_or(ServiceError::NotFound("Event"))?;

    record_activity(
        &state,
        &scope,
        "update",
        "event",
        Some(id),
        Some(event.branch_id),
        json!({ "title": event.title }),
    )
    .await;

    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let event = scope.require(state.stores.school.get_event(id).await?, "Event")?;

    if !state.stores.school.delete_event(id).await? {
        return Err(ServiceError::NotFound("Event").into());
    }

    record_activity(
        &state,
        &scope,
        "delete",
        "event",
        Some(id),
        Some(event.branch_id),
        json!({ "title": event.title }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Create or replace the caller's RSVP. The RSVP inherits the event's tenant.
pub async fn rsvp(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
    body: Result<Json<RsvpRequest>, JsonRejection>,
) -> Result<Json<Rsvp>, AppError> {
    let event = scope.require(state.stores.school.get_event(id).await?, "Event")?;
    // A bodiless RSVP means "attending".
    let status = match body {
        Ok(Json(req)) => req.status,
        Err(JsonRejection::MissingJsonContentType(_)) => RsvpStatus::default(),
        Err(e) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid request body: {}",
                e.body_text()
            )))
        }
    };

    let rsvp = state
        .stores
        .school
        .upsert_rsvp(event.id, &scope.identity.id, status)
        .await?;
    Ok(Json(rsvp))
}

pub async fn list_rsvps(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Rsvp>>, AppError> {
    let event = scope.require(state.stores.school.get_event(id).await?, "Event")?;
    let rsvps = state.stores.school.list_rsvps(event.id).await?;
    Ok(Json(rsvps))
}
