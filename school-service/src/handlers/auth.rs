//! Session routes shared by every strategy.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::auth::{redirect::Found, AuthOutcome};
use crate::dtos::{ErrorResponse, MessageResponse};
use crate::models::Identity;
use crate::services::ServiceError;
use crate::AppState;

/// Current user
#[utoipa::path(
    get,
    path = "/api/auth/user",
    responses(
        (status = 200, description = "The signed-in user", body = Identity),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Session refers to a missing user", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Identity>, AppError> {
    let session = match state.auth.authenticate(&headers).await? {
        AuthOutcome::Authenticated(session) => session,
        AuthOutcome::Unauthenticated(_) => return Err(ServiceError::Unauthenticated.into()),
    };

    let identity = state
        .stores
        .users
        .get_identity(&session.identity_id)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;

    if !identity.is_active {
        return Err(ServiceError::Unauthenticated.into());
    }

    Ok(Json(identity))
}

/// Log out
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session destroyed", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let removal = state.sessions.destroy(&headers).await?;
    Ok((
        jar.add(removal),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Browser logout: destroy the session and go home.
pub async fn logout_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Found), AppError> {
    let removal = state.sessions.destroy(&headers).await?;
    Ok((jar.add(removal), Found::to("/")))
}
