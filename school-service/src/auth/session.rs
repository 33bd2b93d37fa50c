//! Session transport shared by every strategy.
//!
//! The client holds `token.signature`, where `token` is 256 random bits
//! (base64url) and `signature` is a hex HMAC-SHA256 of the token under the
//! session secret. The server stores only the SHA-256 digest of the token, so a
//! leaked session table cannot be replayed as cookies.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{AuthOutcome, UnauthenticatedReason};
use crate::config::SessionConfig;
use crate::models::Session;
use crate::services::{ServiceError, SessionStore};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    secret: Arc<Secret<String>>,
    cookie_name: String,
    ttl_hours: i64,
    secure: bool,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            secret: Arc::new(config.secret.clone()),
            cookie_name: config.cookie_name.clone(),
            ttl_hours: config.ttl_hours,
            secure: config.secure_cookie,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure
    }

    /// Create a session for the identity and return the cookie carrying it.
    pub async fn establish(&self, identity_id: &str) -> Result<Cookie<'static>, ServiceError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let session = Session::new(
            digest(&token),
            identity_id.to_string(),
            chrono::Duration::hours(self.ttl_hours),
        );
        self.store.insert_session(&session).await?;

        tracing::info!(identity_id = %identity_id, "Session established");

        let value = format!("{}.{}", token, self.sign(&token)?);
        Ok(self.cookie(value))
    }

    /// Resolve the session named by the request's cookie or bearer token.
    ///
    /// Errors only when the store fails; bad or stale evidence is an
    /// `Unauthenticated` outcome.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthOutcome, ServiceError> {
        let Some(presented) = self.presented_token(headers) else {
            return Ok(AuthOutcome::Unauthenticated(UnauthenticatedReason::Missing));
        };

        let Some(token) = self.verify(&presented)? else {
            return Ok(AuthOutcome::Unauthenticated(
                UnauthenticatedReason::BadSignature,
            ));
        };

        let id = digest(&token);
        let Some(session) = self.store.get_session(&id).await? else {
            return Ok(AuthOutcome::Unauthenticated(UnauthenticatedReason::Unknown));
        };

        if session.is_expired() {
            if let Err(e) = self.store.delete_session(&id).await {
                tracing::warn!(error = %e, "Failed to delete expired session");
            }
            return Ok(AuthOutcome::Unauthenticated(UnauthenticatedReason::Expired));
        }

        Ok(AuthOutcome::Authenticated(session))
    }

    /// Delete the request's session, if any, and return a cookie that clears it.
    pub async fn destroy(&self, headers: &HeaderMap) -> Result<Cookie<'static>, ServiceError> {
        if let Some(token) = self
            .presented_token(headers)
            .map(|presented| self.verify(&presented))
            .transpose()?
            .flatten()
        {
            self.store.delete_session(&digest(&token)).await?;
            tracing::info!("Session destroyed");
        }

        Ok(self.removal_cookie())
    }

    /// Revoke every session of the identity.
    pub async fn revoke_all(&self, identity_id: &str) -> Result<u64, ServiceError> {
        let revoked = self.store.delete_sessions_for_identity(identity_id).await?;
        if revoked > 0 {
            tracing::info!(identity_id = %identity_id, revoked, "Sessions revoked");
        }
        Ok(revoked)
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.cookie(String::new());
        cookie.make_removal();
        cookie
    }

    fn cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::hours(self.ttl_hours))
            .build()
    }

    fn presented_token(&self, headers: &HeaderMap) -> Option<String> {
        let jar = CookieJar::from_headers(headers);
        if let Some(cookie) = jar.get(&self.cookie_name) {
            return Some(cookie.value().to_string());
        }

        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    }

    fn sign(&self, token: &str) -> Result<String, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid session key: {}", e)))?;
        mac.update(token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns the raw token when the signature matches.
    fn verify(&self, presented: &str) -> Result<Option<String>, ServiceError> {
        let Some((token, signature)) = presented.rsplit_once('.') else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }

        let expected = self.sign(token)?;
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(Some(token.to_string()))
        } else {
            Ok(None)
        }
    }
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;
    use axum::http::HeaderValue;

    fn manager(store: Arc<MemoryStore>, ttl_hours: i64) -> SessionManager {
        SessionManager::new(
            &SessionConfig {
                secret: Secret::new("k".repeat(32)),
                cookie_name: "school.sid".to_string(),
                ttl_hours,
                secure_cookie: false,
            },
            store,
        )
    }

    fn cookie_headers(cookie: &Cookie<'_>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", cookie.name(), cookie.value())).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_establish_then_authenticate() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone(), 1);

        let cookie = sessions.establish("user-1").await.unwrap();
        assert!(cookie.http_only().unwrap_or(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));

        match sessions.authenticate(&cookie_headers(&cookie)).await.unwrap() {
            AuthOutcome::Authenticated(session) => assert_eq!(session.identity_id, "user-1"),
            other => panic!("expected session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_keeps_digest_not_token() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone(), 1);

        let cookie = sessions.establish("user-1").await.unwrap();
        let (token, _) = cookie.value().rsplit_once('.').unwrap();
        assert!(store.get_session(token).await.unwrap().is_none());
        assert!(store.get_session(&digest(token)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bearer_token_is_accepted() {
        let sessions = manager(Arc::new(MemoryStore::new()), 1);
        let cookie = sessions.establish("user-2").await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cookie.value())).unwrap(),
        );
        assert!(matches!(
            sessions.authenticate(&headers).await.unwrap(),
            AuthOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_tampered_signature_is_rejected() {
        let sessions = manager(Arc::new(MemoryStore::new()), 1);
        let cookie = sessions.establish("user-1").await.unwrap();
        let (token, _) = cookie.value().rsplit_once('.').unwrap();

        let forged = Cookie::new("school.sid", format!("{}.{}", token, "00".repeat(32)));
        assert!(matches!(
            sessions.authenticate(&cookie_headers(&forged)).await.unwrap(),
            AuthOutcome::Unauthenticated(UnauthenticatedReason::BadSignature)
        ));
    }

    #[tokio::test]
    async fn test_missing_and_unknown_sessions() {
        let sessions = manager(Arc::new(MemoryStore::new()), 1);
        assert!(matches!(
            sessions.authenticate(&HeaderMap::new()).await.unwrap(),
            AuthOutcome::Unauthenticated(UnauthenticatedReason::Missing)
        ));

        let token = "never-issued";
        let signed = Cookie::new(
            "school.sid",
            format!("{}.{}", token, sessions.sign(token).unwrap()),
        );
        assert!(matches!(
            sessions.authenticate(&cookie_headers(&signed)).await.unwrap(),
            AuthOutcome::Unauthenticated(UnauthenticatedReason::Unknown)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone(), 1);

        let token = "stale-token";
        let mut session = Session::new(digest(token), "user-1".into(), chrono::Duration::hours(1));
        session.expires_at = session.issued_at - chrono::Duration::seconds(1);
        store.insert_session(&session).await.unwrap();

        let cookie = Cookie::new(
            "school.sid",
            format!("{}.{}", token, sessions.sign(token).unwrap()),
        );
        assert!(matches!(
            sessions.authenticate(&cookie_headers(&cookie)).await.unwrap(),
            AuthOutcome::Unauthenticated(UnauthenticatedReason::Expired)
        ));
        assert!(store.get_session(&digest(token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destroy_removes_session_and_clears_cookie() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone(), 1);
        let cookie = sessions.establish("user-1").await.unwrap();
        let headers = cookie_headers(&cookie);

        let removal = sessions.destroy(&headers).await.unwrap();
        assert_eq!(removal.value(), "");
        assert!(matches!(
            sessions.authenticate(&headers).await.unwrap(),
            AuthOutcome::Unauthenticated(UnauthenticatedReason::Unknown)
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_sessions_of_identity() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone(), 1);
        let first = sessions.establish("user-1").await.unwrap();
        sessions.establish("user-1").await.unwrap();
        sessions.establish("user-2").await.unwrap();

        assert_eq!(sessions.revoke_all("user-1").await.unwrap(), 2);
        assert!(matches!(
            sessions.authenticate(&cookie_headers(&first)).await.unwrap(),
            AuthOutcome::Unauthenticated(_)
        ));
        assert_eq!(store.session_count(), 1);
    }
}
