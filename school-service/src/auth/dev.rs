//! Demo-account login for local development. Never available in production.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use super::{
    redirect::{Found, RedirectPolicy},
    AuthStrategy, SessionManager,
};
use crate::config::{AuthStrategyKind, SchoolConfig};
use crate::dtos::auth::{LoginQuery, LoginRequest, OkResponse};
use crate::models::{Identity, Organization, Role};
use crate::services::{SchoolStore, ServiceError, Stores, UserDirectory};
use crate::AppState;

pub struct DevAccount {
    pub id: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub role: Role,
    pub first_name: &'static str,
    pub last_name: &'static str,
}

pub static DEV_ACCOUNTS: [DevAccount; 2] = [
    DevAccount {
        id: "demo-admin",
        email: "admin@demo.school",
        password: "demo123",
        role: Role::Owner,
        first_name: "Demo",
        last_name: "Admin",
    },
    DevAccount {
        id: "demo-teacher",
        email: "teacher@demo.school",
        password: "demo123",
        role: Role::Teacher,
        first_name: "Demo",
        last_name: "Teacher",
    },
];

#[derive(Clone)]
pub struct DevStrategy {
    sessions: SessionManager,
    users: Arc<dyn UserDirectory>,
    school: Arc<dyn SchoolStore>,
    redirects: Arc<RedirectPolicy>,
    organization_id: i64,
}

impl DevStrategy {
    pub fn new(config: &SchoolConfig, stores: &Stores, sessions: SessionManager) -> Self {
        Self {
            sessions,
            users: stores.users.clone(),
            school: stores.school.clone(),
            redirects: Arc::new(RedirectPolicy::new(&config.security)),
            organization_id: config.auth.dev_organization_id,
        }
    }

    /// Make sure the demo organization and every demo account exist.
    pub async fn provision(&self) -> Result<(), ServiceError> {
        self.school
            .ensure_organization(&Organization::new(self.organization_id, "Demo School"))
            .await?;
        for account in &DEV_ACCOUNTS {
            self.bind(account).await?;
        }
        tracing::info!(
            organization_id = self.organization_id,
            "Dev accounts provisioned"
        );
        Ok(())
    }

    /// Insert the account's directory record if absent. Existing records are left as they are.
    async fn bind(&self, account: &DevAccount) -> Result<(), ServiceError> {
        let identity = Identity::new(account.id, account.email, account.role)
            .with_names(
                Some(account.first_name.to_string()),
                Some(account.last_name.to_string()),
            )
            .in_organization(Some(self.organization_id));
        self.users.insert_identity(&identity).await?;
        Ok(())
    }

    /// Bind the account and return its identity, refusing deactivated ones.
    async fn activate(&self, account: &DevAccount) -> Result<Identity, AppError> {
        self.bind(account).await?;
        self.users
            .get_identity(account.id)
            .await?
            .filter(|identity| identity.is_active)
            .ok_or_else(|| {
                tracing::warn!(identity_id = %account.id, strategy = "dev", "Inactive identity refused");
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            })
    }

    fn find_account(email: &str, password: &str) -> Option<&'static DevAccount> {
        let email = email.trim().to_lowercase();
        DEV_ACCOUNTS.iter().find(|account| {
            account.email == email
                && bool::from(account.password.as_bytes().ct_eq(password.as_bytes()))
        })
    }
}

#[async_trait]
impl AuthStrategy for DevStrategy {
    fn kind(&self) -> AuthStrategyKind {
        AuthStrategyKind::Dev
    }

    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn install_session_handling(&self, router: Router<AppState>) -> Router<AppState> {
        let routes: Router<AppState> = Router::new()
            .route("/api/login", get(login_redirect))
            .route("/api/dev/login", post(dev_login))
            .with_state(self.clone());
        router.merge(routes)
    }
}

/// Bind the demo admin and send the browser back to a vetted target.
async fn login_redirect(
    State(dev): State<DevStrategy>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<(CookieJar, Found), AppError> {
    let account = &DEV_ACCOUNTS[0];
    dev.activate(account).await?;
    let cookie = dev.sessions.establish(account.id).await?;

    let target = dev.redirects.safe_redirect(query.redirect.as_deref());
    tracing::info!(identity_id = %account.id, strategy = "dev", "Dev login");

    Ok((jar.add(cookie), Found::to(&target)))
}

async fn dev_login(
    State(dev): State<DevStrategy>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<OkResponse>), AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let account = body
        .credentials()
        .and_then(|(email, password)| DevStrategy::find_account(email, password))
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid credentials")))?;

    dev.activate(account).await?;
    // Replace any session the browser already holds.
    dev.sessions.destroy(&headers).await?;
    let cookie = dev.sessions.establish(account.id).await?;

    tracing::info!(identity_id = %account.id, strategy = "dev", "Dev login");
    Ok((jar.add(cookie), Json(OkResponse { ok: true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_account_matches_email_and_password() {
        assert_eq!(
            DevStrategy::find_account(" Admin@Demo.School ", "demo123").map(|a| a.id),
            Some("demo-admin")
        );
        assert_eq!(
            DevStrategy::find_account("teacher@demo.school", "demo123").map(|a| a.role),
            Some(Role::Teacher)
        );
        assert!(DevStrategy::find_account("admin@demo.school", "demo1234").is_none());
        assert!(DevStrategy::find_account("nobody@demo.school", "demo123").is_none());
    }
}
