pub mod auth;
pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{AuthStrategy, SessionManager};
use crate::config::{Environment, SchoolConfig};
use crate::services::Stores;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::current_user,
        handlers::auth::logout,
        auth::custom::login,
        auth::custom::setup_admin,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::SetupAdminRequest,
            dtos::auth::SetupAdminResponse,
            dtos::auth::OkResponse,
            models::Identity,
            models::Role,
            models::Language,
        )
    ),
    tags(
        (name = "Authentication", description = "Login, logout and session inspection"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Session schemes, named after the deployment's cookie.
struct SecurityAddon<'a> {
    cookie_name: &'a str,
}

impl Modify for SecurityAddon<'_> {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(self.cookie_name))),
            );
            components.add_security_scheme(
                "bearer_session",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

pub fn api_doc(config: &SchoolConfig) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    SecurityAddon {
        cookie_name: &config.session.cookie_name,
    }
    .modify(&mut doc);
    doc
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SchoolConfig>,
    pub stores: Stores,
    pub auth: Arc<dyn AuthStrategy>,
    pub sessions: SessionManager,
}

impl AppState {
    /// Wire the session transport and the configured auth strategy over `stores`.
    /// Fails when the strategy cannot start.
    pub async fn new(config: SchoolConfig, stores: Stores) -> Result<Self, AppError> {
        let sessions = SessionManager::new(&config.session, stores.sessions.clone());
        let auth = auth::resolve_strategy(&config, &stores, sessions.clone()).await?;
        Ok(Self {
            config: Arc::new(config),
            stores,
            auth,
            sessions,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut app: Router<AppState> = Router::new().route("/health", get(health_check));

    let doc = api_doc(&state.config);
    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", doc));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(move || {
                let doc = doc.clone();
                async move { Json(doc) }
            }),
        );
    }

    let app = app
        .route("/api/auth/user", get(handlers::auth::current_user))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/logout", get(handlers::auth::logout_redirect));

    // Login and callback routes depend on the active strategy.
    let app = state.auth.install_session_handling(app);

    let protected = Router::new()
        .route("/api/profile", patch(handlers::profile::update_profile))
        .route(
            "/api/organization",
            get(handlers::organization::get_organization)
                .patch(handlers::organization::update_organization),
        )
        .route(
            "/api/settings",
            get(handlers::organization::get_settings)
                .patch(handlers::organization::update_settings),
        )
        .route(
            "/api/branches",
            get(handlers::branches::list_branches).post(handlers::branches::create_branch),
        )
        .route(
            "/api/branches/:id",
            get(handlers::branches::get_branch)
                .patch(handlers::branches::update_branch)
                .delete(handlers::branches::delete_branch),
        )
        .route(
            "/api/events",
            get(handlers::events::list_events).post(handlers::events::create_event),
        )
        .route(
            "/api/events/:id",
            get(handlers::events::get_event)
                .patch(handlers::events::update_event)
                .delete(handlers::events::delete_event),
        )
        .route("/api/events/:id/rsvp", post(handlers::events::rsvp))
        .route("/api/events/:id/rsvps", get(handlers::events::list_rsvps))
        .route(
            "/api/posts",
            get(handlers::posts::list_posts).post(handlers::posts::create_post),
        )
        .route(
            "/api/posts/:id",
            get(handlers::posts::get_post)
                .patch(handlers::posts::update_post)
                .delete(handlers::posts::delete_post),
        )
        .route("/api/analytics/overview", get(handlers::analytics::overview))
        .route("/api/activity", get(handlers::activity::list_activity))
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/users/:id",
            patch(handlers::users::update_user).delete(handlers::users::deactivate_user),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/notifications/:id/read",
            patch(handlers::notifications::mark_read),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    app.merge(protected)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

/// Credentialed CORS for the configured origins. Wildcards and unparsable
/// entries are dropped.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                tracing::warn!("Wildcard CORS origin ignored for credentialed requests");
                return None;
            }
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(origin = %origin, error = %e, "Invalid CORS origin skipped");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Storage is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.school.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Storage health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "auth_strategy": state.auth.kind().as_str(),
    })))
}
