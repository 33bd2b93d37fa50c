//! Email/password login against the credential store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use secrecy::ExposeSecret;
use service_core::error::AppError;

use super::{AuthStrategy, SessionManager};
use crate::config::{AdminConfig, AuthStrategyKind, SchoolConfig};
use crate::dtos::auth::{LoginRequest, SetupAdminRequest, SetupAdminResponse};
use crate::dtos::ErrorResponse;
use crate::models::{CredentialRecord, Identity, Organization, Role};
use crate::services::{CredentialStore, SchoolStore, ServiceError, Stores, UserDirectory};
use crate::utils::{Password, PasswordHashString, PasswordHasher};
use crate::AppState;

#[derive(Clone)]
pub struct CustomStrategy {
    sessions: SessionManager,
    users: Arc<dyn UserDirectory>,
    credentials: Arc<dyn CredentialStore>,
    school: Arc<dyn SchoolStore>,
    hasher: Arc<PasswordHasher>,
    admin: Arc<AdminConfig>,
}

/// Fields needed to create an owner account with a password.
pub struct NewAdmin<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_id: Option<i64>,
}

impl CustomStrategy {
    pub fn new(
        config: &SchoolConfig,
        stores: &Stores,
        sessions: SessionManager,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            sessions,
            users: stores.users.clone(),
            credentials: stores.credentials.clone(),
            school: stores.school.clone(),
            hasher: Arc::new(PasswordHasher::new(&config.password_hashing)?),
            admin: Arc::new(config.admin.clone()),
        })
    }

    /// Ensure the configured admin can log in. A stored credential for the
    /// admin email is left untouched.
    pub async fn provision_admin(&self) -> Result<(), ServiceError> {
        let email = self
            .admin
            .email
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("ADMIN_EMAIL is not configured".to_string()))?;

        if self.credentials.find_credential(email).await?.is_some() {
            tracing::info!(email = %email, "Admin credential already present");
            return Ok(());
        }

        let password_hash = match (&self.admin.password_hash, &self.admin.password) {
            (Some(hash), _) => {
                PasswordHasher::check_format(hash)?;
                hash.clone()
            }
            (None, Some(password)) => {
                self.hash(Password::new(password.expose_secret().clone()))
                    .await?
                    .into_string()
            }
            (None, None) => {
                return Err(ServiceError::Validation(
                    "ADMIN_PASSWORD or ADMIN_PASSWORD_HASH must be configured".to_string(),
                ))
            }
        };

        let organization_id = self.admin.organization_id;
        self.school
            .ensure_organization(&Organization::new(organization_id, "Default School"))
            .await?;

        let identity = match self.users.find_identity_by_email(email).await? {
            Some(existing) => existing,
            None => {
                let identity = Identity::new(new_admin_id(), email, Role::Owner)
                    .with_names(Some("Admin".to_string()), Some("User".to_string()))
                    .in_organization(Some(organization_id));
                self.users.insert_identity(&identity).await?;
                identity
            }
        };

        self.credentials
            .insert_credential(&CredentialRecord::new(
                identity.id.clone(),
                email,
                password_hash,
            ))
            .await?;

        tracing::info!(identity_id = %identity.id, "Admin credential provisioned");
        Ok(())
    }

    /// Verify an email/password pair. Every failure is the same
    /// `InvalidCredentials`, and unknown emails still pay for one hash check.
    pub async fn authenticate_by_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ServiceError> {
        let email = email.trim().to_lowercase();
        let password = Password::new(password.to_string());

        let Some(record) = self.credentials.find_credential(&email).await? else {
            let hasher = self.hasher.clone();
            tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
                .await
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
            return Err(ServiceError::InvalidCredentials);
        };

        let hasher = self.hasher.clone();
        let stored = PasswordHashString::new(record.password_hash);
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        if verified.is_err() {
            return Err(ServiceError::InvalidCredentials);
        }

        self.users
            .get_identity(&record.identity_id)
            .await?
            .filter(|identity| identity.is_active)
            .ok_or(ServiceError::InvalidCredentials)
    }

    /// Create an owner account. Fails with `Conflict` when the email is taken.
    pub async fn setup_admin(&self, admin: NewAdmin<'_>) -> Result<Identity, ServiceError> {
        let email = admin.email.trim().to_lowercase();

        if self.credentials.find_credential(&email).await?.is_some()
            || self.users.find_identity_by_email(&email).await?.is_some()
        {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let organization_id = admin.organization_id.unwrap_or(self.admin.organization_id);
        self.school
            .ensure_organization(&Organization::new(organization_id, "Default School"))
            .await?;

        let hash = self.hash(Password::new(admin.password.to_string())).await?;

        let identity = Identity::new(new_admin_id(), email.as_str(), Role::Owner)
            .with_names(
                Some(admin.first_name.unwrap_or_else(|| "Admin".to_string())),
                Some(admin.last_name.unwrap_or_else(|| "User".to_string())),
            )
            .in_organization(Some(organization_id));

        // Identity and credential are written atomically.
        let record = CredentialRecord::new(identity.id.clone(), &email, hash.into_string());
        if !self.credentials.register(&identity, &record).await? {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        tracing::info!(identity_id = %identity.id, organization_id, "Admin account created");
        Ok(identity)
    }

    async fn hash(&self, password: Password) -> Result<PasswordHashString, ServiceError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))??;
        Ok(hash)
    }
}

fn new_admin_id() -> String {
    format!("admin-{}", uuid::Uuid::new_v4())
}

#[async_trait]
impl AuthStrategy for CustomStrategy {
    fn kind(&self) -> AuthStrategyKind {
        AuthStrategyKind::Custom
    }

    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn install_session_handling(&self, router: Router<AppState>) -> Router<AppState> {
        let routes: Router<AppState> = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/setup-admin", post(setup_admin))
            .with_state(self.clone());
        router.merge(routes)
    }
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = Identity),
        (status = 400, description = "Email or password missing", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(custom): State<CustomStrategy>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Identity>), AppError> {
    let Json(body) = body
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text())))?;
    let (email, password) = body.credentials().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Email and password are required"))
    })?;

    let identity = custom
        .authenticate_by_credential(email, password)
        .await
        .inspect_err(|e| {
            if matches!(e, ServiceError::InvalidCredentials) {
                tracing::info!(strategy = "custom", reason = "invalid_credentials", "Login rejected");
            }
        })?;

    custom.sessions.destroy(&headers).await?;
    let cookie = custom.sessions.establish(&identity.id).await?;

    tracing::info!(identity_id = %identity.id, strategy = "custom", "User logged in");
    Ok((jar.add(cookie), Json(identity)))
}

/// Bootstrap an owner account. Only available while `ALLOW_ADMIN_SETUP` is on.
#[utoipa::path(
    post,
    path = "/api/auth/setup-admin",
    request_body = SetupAdminRequest,
    responses(
        (status = 200, description = "Admin created", body = SetupAdminResponse),
        (status = 400, description = "Email or password missing", body = ErrorResponse),
        (status = 403, description = "Admin setup disabled", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn setup_admin(
    State(custom): State<CustomStrategy>,
    body: Result<Json<SetupAdminRequest>, JsonRejection>,
) -> Result<Json<SetupAdminResponse>, AppError> {
    if !custom.admin.allow_setup {
        tracing::warn!("Admin setup attempted while disabled");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Admin setup is not allowed"
        )));
    }

    let Json(body) = body
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text())))?;

    let email = body.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let password = body.password.as_deref().filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Email and password are required"
        )));
    };

    let user = custom
        .setup_admin(NewAdmin {
            email,
            password,
            first_name: body.first_name.clone(),
            last_name: body.last_name.clone(),
            organization_id: body.organization_id,
        })
        .await?;

    Ok(Json(SetupAdminResponse {
        message: "Admin user created successfully".to_string(),
        user,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PasswordHashConfig, SessionConfig};
    use crate::services::MemoryStore;
    use secrecy::Secret;

    fn strategy(admin: AdminConfig) -> (CustomStrategy, Stores) {
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
        let sessions = SessionManager::new(
            &SessionConfig {
                secret: Secret::new("s".repeat(32)),
                cookie_name: "school.sid".to_string(),
                ttl_hours: 1,
                secure_cookie: false,
            },
            stores.sessions.clone(),
        );
        let custom = CustomStrategy {
            sessions,
            users: stores.users.clone(),
            credentials: stores.credentials.clone(),
            school: stores.school.clone(),
            hasher: Arc::new(
                PasswordHasher::new(&PasswordHashConfig {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                })
                .unwrap(),
            ),
            admin: Arc::new(admin),
        };
        (custom, stores)
    }

    fn admin_config(password: Option<&str>, hash: Option<String>) -> AdminConfig {
        AdminConfig {
            email: Some("admin@school.example".to_string()),
            password: password.map(|p| Secret::new(p.to_string())),
            password_hash: hash,
            organization_id: 1,
            allow_setup: false,
        }
    }

    #[tokio::test]
    async fn test_provision_then_login() {
        let (custom, stores) = strategy(admin_config(Some("Sup3r-secret"), None));
        custom.provision_admin().await.unwrap();

        let identity = custom
            .authenticate_by_credential("Admin@School.example", "Sup3r-secret")
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Owner);
        assert_eq!(identity.organization_id, Some(1));
        assert!(stores.school.get_organization(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let (custom, stores) = strategy(admin_config(Some("Sup3r-secret"), None));
        custom.provision_admin().await.unwrap();
        let first = stores
            .credentials
            .find_credential("admin@school.example")
            .await
            .unwrap()
            .unwrap();

        custom.provision_admin().await.unwrap();
        let second = stores
            .credentials
            .find_credential("admin@school.example")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.password_hash, second.password_hash);
    }

    #[tokio::test]
    async fn test_provision_from_prehashed_password() {
        let (probe, _) = strategy(admin_config(None, None));
        let hash = probe
            .hash(Password::new("from-hash".to_string()))
            .await
            .unwrap()
            .into_string();

        let (custom, _) = strategy(admin_config(None, Some(hash)));
        custom.provision_admin().await.unwrap();
        assert!(custom
            .authenticate_by_credential("admin@school.example", "from-hash")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_provision_requires_a_password() {
        let (custom, _) = strategy(admin_config(None, None));
        assert!(matches!(
            custom.provision_admin().await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let (custom, stores) = strategy(admin_config(Some("Sup3r-secret"), None));
        custom.provision_admin().await.unwrap();

        let wrong_password = custom
            .authenticate_by_credential("admin@school.example", "nope")
            .await;
        let unknown_email = custom
            .authenticate_by_credential("ghost@school.example", "nope")
            .await;
        assert!(matches!(wrong_password, Err(ServiceError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(ServiceError::InvalidCredentials)));

        let identity = stores
            .users
            .find_identity_by_email("admin@school.example")
            .await
            .unwrap()
            .unwrap();
        stores
            .users
            .update_identity(
                &identity.id,
                &crate::models::IdentityUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            custom
                .authenticate_by_credential("admin@school.example", "Sup3r-secret")
                .await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_setup_admin_conflicts_on_existing_email() {
        let (custom, _) = strategy(admin_config(Some("Sup3r-secret"), None));
        custom.provision_admin().await.unwrap();

        let result = custom
            .setup_admin(NewAdmin {
                email: "ADMIN@school.example",
                password: "another",
                first_name: None,
                last_name: None,
                organization_id: None,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }
}
