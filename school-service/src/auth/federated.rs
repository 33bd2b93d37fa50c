//! Authorization-code login against an external identity provider.
//!
//! Provider specifics stay behind [`IdentityProvider`]; the rest of the system
//! only ever sees a local session.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use url::Url;

use super::{redirect::Found, AuthStrategy, SessionManager};
use crate::config::{AuthStrategyKind, FederatedConfig, SchoolConfig};
use crate::dtos::auth::CallbackQuery;
use crate::models::{Identity, Organization, Role};
use crate::services::{SchoolStore, ServiceError, Stores, UserDirectory};
use crate::AppState;

const STATE_COOKIE: &str = "oauth_state";
const VERIFIER_COOKIE: &str = "code_verifier";

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str, code_verifier: &str)
        -> Result<TokenSet, ServiceError>;
}

/// Token exchange over HTTPS with `reqwest`.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
    redirect_uri: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &FederatedConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        Ok(Self {
            client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet, ServiceError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Provider(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| ServiceError::Provider(format!("invalid token response: {}", e)))
    }
}

#[derive(Clone)]
pub struct FederatedStrategy {
    sessions: SessionManager,
    users: Arc<dyn UserDirectory>,
    school: Arc<dyn SchoolStore>,
    provider: Arc<dyn IdentityProvider>,
    authorize_url: Arc<Url>,
    issuer: String,
    client_id: String,
    redirect_uri: String,
    client_secret: Arc<Secret<String>>,
    default_organization_id: Option<i64>,
}

impl FederatedStrategy {
    pub fn new(
        config: &SchoolConfig,
        stores: &Stores,
        sessions: SessionManager,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ServiceError> {
        let federated = config.federated.as_ref().ok_or_else(|| {
            ServiceError::Validation("Federated provider settings are missing".to_string())
        })?;
        let authorize_url = Url::parse(&federated.authorize_url).map_err(|e| {
            ServiceError::Validation(format!("FEDERATED_AUTHORIZE_URL is invalid: {}", e))
        })?;

        Ok(Self {
            sessions,
            users: stores.users.clone(),
            school: stores.school.clone(),
            provider,
            authorize_url: Arc::new(authorize_url),
            issuer: federated.issuer.clone(),
            client_id: federated.client_id.clone(),
            redirect_uri: federated.redirect_uri.clone(),
            client_secret: Arc::new(federated.client_secret.clone()),
            default_organization_id: federated.default_organization_id,
        })
    }

    /// Make sure the organization new federated users land in exists.
    pub async fn provision(&self) -> Result<(), ServiceError> {
        if let Some(id) = self.default_organization_id {
            self.school
                .ensure_organization(&Organization::new(id, "Default School"))
                .await?;
        }
        Ok(())
    }

    fn authorization_redirect(&self, state: &str, code_challenge: &str) -> Url {
        let mut url = (*self.authorize_url).clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }

    /// Check signature, issuer, audience and expiry of the provider's ID token.
    pub fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);

        jsonwebtoken::decode::<IdTokenClaims>(
            id_token,
            &DecodingKey::from_secret(self.client_secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| ServiceError::Provider(format!("ID token rejected: {}", e)))
    }

    /// Insert a directory record for a first-time subject; returning users keep theirs.
    async fn upsert_identity(&self, claims: IdTokenClaims) -> Result<Identity, ServiceError> {
        if let Some(existing) = self.users.get_identity(&claims.sub).await? {
            return Ok(existing);
        }

        let email = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ServiceError::Provider("ID token carries no email".to_string()))?;

        let mut identity = Identity::new(claims.sub.clone(), email, Role::Parent)
            .with_names(claims.given_name, claims.family_name)
            .in_organization(self.default_organization_id);
        identity.profile_image_url = claims.picture;

        if !self.users.insert_identity(&identity).await? {
            // Lost a race with a concurrent first login, or the email is taken.
            return self
                .users
                .get_identity(&claims.sub)
                .await?
                .ok_or_else(|| {
                    ServiceError::Conflict("Email already linked to another account".to_string())
                });
        }

        tracing::info!(identity_id = %identity.id, "Federated identity created");
        Ok(identity)
    }

    fn flow_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.sessions.secure_cookies())
            .same_site(SameSite::Lax)
            .max_age(time::Duration::minutes(5))
            .build()
    }
}

#[async_trait]
impl AuthStrategy for FederatedStrategy {
    fn kind(&self) -> AuthStrategyKind {
        AuthStrategyKind::Federated
    }

    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn install_session_handling(&self, router: Router<AppState>) -> Router<AppState> {
        let routes: Router<AppState> = Router::new()
            .route("/api/login", get(login))
            .route("/api/callback", get(callback))
            .with_state(self.clone());
        router.merge(routes)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

async fn login(
    State(federated): State<FederatedStrategy>,
    jar: CookieJar,
) -> (CookieJar, Found) {
    let state = random_token();
    let verifier = random_token();
    let url = federated.authorization_redirect(&state, &code_challenge(&verifier));

    let jar = jar
        .add(federated.flow_cookie(STATE_COOKIE, state))
        .add(federated.flow_cookie(VERIFIER_COOKIE, verifier));

    (jar, Found::to(url.as_str()))
}

async fn callback(
    State(federated): State<FederatedStrategy>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Found), AppError> {
    if let Some(error) = &query.error {
        tracing::warn!(error = %error, strategy = "federated", "Provider returned an error");
        return Err(AppError::AuthError(anyhow::anyhow!("Authentication failed")));
    }

    let stored_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    match (&stored_state, &query.state) {
        (Some(stored), Some(received)) if stored == received => {}
        _ => {
            tracing::warn!(strategy = "federated", reason = "state_mismatch", "Login rejected");
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
        }
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;
    let verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing code verifier")))?;

    let tokens = federated.provider.exchange_code(code, &verifier).await?;
    let claims = federated.verify_id_token(&tokens.id_token)?;
    let identity = federated.upsert_identity(claims).await?;

    if !identity.is_active {
        tracing::warn!(identity_id = %identity.id, strategy = "federated", "Inactive identity refused");
        return Err(ServiceError::Unauthenticated.into());
    }

    let cookie = federated.sessions.establish(&identity.id).await?;
    tracing::info!(identity_id = %identity.id, strategy = "federated", "User logged in");

    let jar = jar
        .remove(Cookie::build(STATE_COOKIE).path("/"))
        .remove(Cookie::build(VERIFIER_COOKIE).path("/"))
        .add(cookie);

    Ok((jar, Found::to("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_challenge_matches_rfc7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mA92-mEhvD7BT6b4VS9W2khvMS5Ct4"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_random_tokens_are_unique() {
        assert_ne!(random_token(), random_token());
        assert_eq!(random_token().len(), 43);
    }
}
