use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

use super::record_activity;
use crate::dtos::school::{BranchFilter, CreatePostRequest};
use crate::middleware::TenantScope;
use crate::models::{NewPost, Post, PostUpdate};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn list_posts(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<BranchFilter>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state
        .stores
        .school
        .list_posts(scope.organization_id, filter.branch_id)
        .await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    let post = scope.require(state.stores.school.get_post(id).await?, "Post")?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    scope.require(state.stores.school.get_branch(req.branch_id).await?, "Branch")?;

    let post = state
        .stores
        .school
        .create_post(NewPost {
            organization_id: scope.organization_id,
            branch_id: req.branch_id,
            title: req.title,
            content: req.content,
            post_type: req.post_type,
            created_by: scope.identity.id.clone(),
            scheduled_for: req.scheduled_for,
            is_published: req.is_published,
            social_platforms: req.social_platforms,
            image_url: req.image_url,
        })
        .await?;

    record_activity(
        &state,
        &scope,
        "create",
        "post",
        Some(post.id),
        Some(post.branch_id),
        json!({ "title": post.title, "type": post.post_type.as_str() }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
    ValidatedJson(update): ValidatedJson<PostUpdate>,
) -> Result<Json<Post>, AppError> {
    scope.require(state.stores.school.get_post(id).await?, "Post")?;
    if let Some(branch_id) = update.branch_id {
        scope.require(state.stores.school.get_branch(branch_id).await?, "Branch")?;
    }

    let post = state
        .stores
        .school
        .update_post(id, &update)
        .await?
        .ok_or(ServiceError::NotFound("Post"))?;

    record_activity(
        &state,
        &scope,
        "update",
        "post",
        Some(id),
        Some(post.branch_id),
        json!({ "title": post.title }),
    )
    .await;

    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let post = scope.require(state.stores.school.get_post(id).await?, "Post")?;

    if !state.stores.school.delete_post(id).await? {
        return Err(ServiceError::NotFound("Post").into());
    }

    record_activity(
        &state,
        &scope,
        "delete",
        "post",
        Some(id),
        Some(post.branch_id),
        json!({ "title": post.title }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
