//! Pluggable authentication. One strategy is chosen at start and serves the
//! whole process; all of them share the same session transport.

pub mod custom;
pub mod dev;
pub mod federated;
pub mod redirect;
pub mod resolver;
pub mod session;

pub use resolver::resolve_strategy;
pub use session::SessionManager;

use async_trait::async_trait;
use axum::{http::HeaderMap, Router};

use crate::config::AuthStrategyKind;
use crate::models::Session;
use crate::services::ServiceError;
use crate::AppState;

/// Why a request carried no usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    Missing,
    BadSignature,
    Unknown,
    Expired,
}

#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(Session),
    Unauthenticated(UnauthenticatedReason),
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn kind(&self) -> AuthStrategyKind;

    fn sessions(&self) -> &SessionManager;

    /// Mount the strategy's login and callback routes. Called once while the
    /// router is built.
    fn install_session_handling(&self, router: Router<AppState>) -> Router<AppState>;

    /// Extract the session from request headers. Never fails on missing or
    /// invalid evidence; errors only when the session store does.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthOutcome, ServiceError> {
        self.sessions().authenticate(headers).await
    }
}
