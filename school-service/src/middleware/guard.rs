//! Access control for every protected route.
//!
//! `require_session` turns a request into an active identity (401 otherwise).
//! `RequireRoles<R>` then admits only the roles in `R` (403 otherwise) before
//! the handler body runs.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use service_core::error::AppError;

use crate::auth::AuthOutcome;
use crate::models::{Identity, Role};
use crate::services::{ServiceError, UserDirectory};
use crate::AppState;

/// Last-login writes closer together than this are skipped.
const LAST_LOGIN_DEBOUNCE_SECS: i64 = 60;

/// The authenticated, active identity behind the current request.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = match state.auth.authenticate(req.headers()).await? {
        AuthOutcome::Authenticated(session) => session,
        AuthOutcome::Unauthenticated(reason) => {
            tracing::debug!(?reason, "Unauthenticated request rejected");
            return Err(ServiceError::Unauthenticated.into());
        }
    };

    let identity = match state.stores.users.get_identity(&session.identity_id).await? {
        Some(identity) if identity.is_active => identity,
        Some(_) => {
            tracing::info!(identity_id = %session.identity_id, "Session of inactive identity rejected");
            return Err(ServiceError::Unauthenticated.into());
        }
        None => {
            tracing::info!(identity_id = %session.identity_id, "Session of unknown identity rejected");
            return Err(ServiceError::Unauthenticated.into());
        }
    };

    touch_last_login(state.stores.users.clone(), &identity);

    req.extensions_mut().insert(CurrentIdentity(identity));
    Ok(next.run(req).await)
}

/// Record the login time off the request path. Failures are logged and dropped.
fn touch_last_login(users: Arc<dyn UserDirectory>, identity: &Identity) {
    let now = Utc::now();
    if identity
        .last_login_at
        .is_some_and(|at| now - at < Duration::seconds(LAST_LOGIN_DEBOUNCE_SECS))
    {
        return;
    }

    let identity_id = identity.id.clone();
    tokio::spawn(async move {
        if let Err(e) = users.record_login(&identity_id, now).await {
            tracing::warn!(identity_id = %identity_id, error = %e, "Failed to record last login");
        }
    });
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentIdentity>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Identity missing from request extensions"
                ))
            })
    }
}

/// A fixed set of roles a route admits.
pub trait RoleSet: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

/// Owners and admins.
pub struct OrgAdmins;

impl RoleSet for OrgAdmins {
    const ROLES: &'static [Role] = &[Role::Owner, Role::Admin];
}

/// Extractor that admits only identities whose role is in `R`.
pub struct RequireRoles<R: RoleSet>(pub Identity, PhantomData<R>);

impl<R: RoleSet> RequireRoles<R> {
    pub fn identity(&self) -> &Identity {
        &self.0
    }

    fn check(identity: Identity) -> Result<Self, AppError> {
        if R::ROLES.contains(&identity.role) {
            Ok(Self(identity, PhantomData))
        } else {
            tracing::info!(
                identity_id = %identity.id,
                role = %identity.role,
                "Insufficient permissions"
            );
            Err(AppError::Forbidden(anyhow::anyhow!("Insufficient permissions")))
        }
    }
}

#[async_trait]
impl<S, R> FromRequestParts<S> for RequireRoles<R>
where
    S: Send + Sync,
    R: RoleSet,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;
        Self::check(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_admins_admit_owner_and_admin_only() {
        for role in [Role::Owner, Role::Admin] {
            assert!(RequireRoles::<OrgAdmins>::check(Identity::new("u", "u@x.io", role)).is_ok());
        }
        for role in [Role::Teacher, Role::Parent, Role::Student] {
            assert!(RequireRoles::<OrgAdmins>::check(Identity::new("u", "u@x.io", role)).is_err());
        }
    }

    #[tokio::test]
    async fn test_recent_login_is_not_rewritten() {
        let store = Arc::new(crate::services::MemoryStore::new());
        let mut identity = Identity::new("u1", "u1@x.io", Role::Teacher);
        let recent = Utc::now() - Duration::seconds(5);
        identity.last_login_at = Some(recent);
        store.insert_identity(&identity).await.unwrap();

        touch_last_login(store.clone(), &identity);
        tokio::task::yield_now().await;

        let stored = store.get_identity("u1").await.unwrap().unwrap();
        assert_eq!(stored.last_login_at, Some(recent));
    }
}
