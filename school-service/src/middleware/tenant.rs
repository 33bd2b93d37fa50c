//! Tenant scoping for resource handlers.
//!
//! Every data handler resolves the caller's organization through
//! [`TenantScope`] and passes each fetched or referenced resource through it.
//! A resource of another organization is always a 403, never a 404.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;
use thiserror::Error;

use super::guard::CurrentIdentity;
use crate::models::{ActivityLog, Branch, Event, Identity, Notification, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TenantError {
    #[error("User not associated with an organization")]
    NotAssociated,

    #[error("Access denied")]
    AccessDenied,
}

impl From<TenantError> for AppError {
    fn from(err: TenantError) -> Self {
        AppError::Forbidden(anyhow::anyhow!(err))
    }
}

pub fn resolve_organization(identity: &Identity) -> Result<i64, TenantError> {
    identity.organization_id.ok_or(TenantError::NotAssociated)
}

pub fn assert_same_tenant(resource_org: i64, caller_org: i64) -> Result<(), TenantError> {
    if resource_org == caller_org {
        Ok(())
    } else {
        Err(TenantError::AccessDenied)
    }
}

/// Anything that belongs to exactly one organization.
pub trait TenantOwned {
    fn organization_id(&self) -> Option<i64>;
}

macro_rules! tenant_owned {
    ($($ty:ty),+) => {
        $(impl TenantOwned for $ty {
            fn organization_id(&self) -> Option<i64> {
                Some(self.organization_id)
            }
        })+
    };
}

tenant_owned!(Branch, Event, Post, Notification, ActivityLog);

impl TenantOwned for Identity {
    fn organization_id(&self) -> Option<i64> {
        self.organization_id
    }
}

/// The caller together with their resolved organization.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub identity: Identity,
    pub organization_id: i64,
}

impl TenantScope {
    pub fn new(identity: Identity) -> Result<Self, TenantError> {
        let organization_id = resolve_organization(&identity)?;
        Ok(Self {
            identity,
            organization_id,
        })
    }

    pub fn ensure_owns<T: TenantOwned>(&self, resource: T) -> Result<T, TenantError> {
        match resource.organization_id() {
            Some(org) => assert_same_tenant(org, self.organization_id).map(|_| resource),
            None => Err(TenantError::AccessDenied),
        }
    }

    /// 404 when absent, 403 when it belongs to another organization.
    pub fn require<T: TenantOwned>(
        &self,
        found: Option<T>,
        what: &'static str,
    ) -> Result<T, AppError> {
        let resource =
            found.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("{} not found", what)))?;
        Ok(self.ensure_owns(resource)?)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;
        TenantScope::new(identity).map_err(|e| {
            tracing::info!(error = %e, "Request without tenant rejected");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;

    fn branch(organization_id: i64) -> Branch {
        Branch {
            id: 1,
            organization_id,
            name: "Main".to_string(),
            address: None,
            phone: None,
            email: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_organization() {
        let member = Identity::new("a", "a@x.io", Role::Teacher).in_organization(Some(3));
        assert_eq!(resolve_organization(&member), Ok(3));

        let orphan = Identity::new("b", "b@x.io", Role::Parent);
        assert_eq!(resolve_organization(&orphan), Err(TenantError::NotAssociated));
    }

    #[test]
    fn test_assert_same_tenant() {
        assert!(assert_same_tenant(4, 4).is_ok());
        assert_eq!(assert_same_tenant(4, 5), Err(TenantError::AccessDenied));
    }

    #[test]
    fn test_scope_rejects_foreign_resources() {
        let scope =
            TenantScope::new(Identity::new("a", "a@x.io", Role::Owner).in_organization(Some(1)))
                .unwrap();
        assert!(scope.ensure_owns(branch(1)).is_ok());
        assert_eq!(
            scope.ensure_owns(branch(2)).map(|b| b.id),
            Err(TenantError::AccessDenied)
        );

        let unassigned = Identity::new("c", "c@x.io", Role::Parent);
        assert_eq!(
            scope.ensure_owns(unassigned).map(|i| i.id),
            Err(TenantError::AccessDenied)
        );
    }

    #[test]
    fn test_require_distinguishes_missing_from_foreign() {
        let scope =
            TenantScope::new(Identity::new("a", "a@x.io", Role::Owner).in_organization(Some(1)))
                .unwrap();
        assert!(matches!(
            scope.require::<Branch>(None, "Branch"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            scope.require(Some(branch(9)), "Branch"),
            Err(AppError::Forbidden(_))
        ));
    }
}
