//! Identity model - a person known to the platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Platform role. Closed set; unknown values are rejected at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Teacher,
    #[default]
    Parent,
    Student,
}

text_enum!(Role {
    Owner => "owner",
    Admin => "admin",
    Teacher => "teacher",
    Parent => "parent",
    Student => "student",
});

impl Role {
    /// Owners and admins manage organization-level resources.
    pub fn is_org_admin(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

text_enum!(Language {
    En => "en",
    Es => "es",
});

/// A user account. `organization_id` may be absent for federated users that
/// have not been assigned to a school yet; such users cannot reach tenant data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub organization_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub branch_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub language: Language,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: email.into().to_lowercase(),
            first_name: None,
            last_name: None,
            profile_image_url: None,
            organization_id: None,
            role,
            branch_id: None,
            language: Language::En,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_names(mut self, first: Option<String>, last: Option<String>) -> Self {
        self.first_name = first;
        self.last_name = last;
        self
    }

    pub fn in_organization(mut self, organization_id: Option<i64>) -> Self {
        self.organization_id = organization_id;
        self
    }

    /// Apply a partial update in place; absent fields are left unchanged.
    pub fn apply(&mut self, update: &IdentityUpdate) {
        if let Some(v) = &update.first_name {
            self.first_name = Some(v.clone());
        }
        if let Some(v) = &update.last_name {
            self.last_name = Some(v.clone());
        }
        if let Some(v) = &update.email {
            self.email = v.to_lowercase();
        }
        if let Some(v) = &update.profile_image_url {
            self.profile_image_url = Some(v.clone());
        }
        if let Some(v) = update.language {
            self.language = v;
        }
        if let Some(v) = update.role {
            self.role = v;
        }
        if let Some(v) = update.branch_id {
            self.branch_id = Some(v);
        }
        if let Some(v) = update.is_active {
            self.is_active = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial identity change. The organization is deliberately not updatable.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
    pub language: Option<Language>,
    pub role: Option<Role>,
    pub branch_id: Option<i64>,
    pub is_active: Option<bool>,
}

impl IdentityUpdate {
    /// Changes that must invalidate every live session of the identity.
    pub fn revokes_sessions(&self) -> bool {
        self.role.is_some() || self.is_active == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_text() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(Role::Owner.as_str(), "owner");
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::default(), Role::Parent);
    }

    #[test]
    fn test_apply_update_keeps_organization() {
        let mut identity = Identity::new("u1", "Jane@Example.com", Role::Teacher)
            .in_organization(Some(4));
        identity.apply(&IdentityUpdate {
            email: Some("NEW@example.com".to_string()),
            role: Some(Role::Admin),
            ..Default::default()
        });

        assert_eq!(identity.email, "new@example.com");
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.organization_id, Some(4));
    }

    #[test]
    fn test_revokes_sessions_on_role_or_deactivation() {
        assert!(IdentityUpdate {
            role: Some(Role::Parent),
            ..Default::default()
        }
        .revokes_sessions());
        assert!(IdentityUpdate {
            is_active: Some(false),
            ..Default::default()
        }
        .revokes_sessions());
        assert!(!IdentityUpdate {
            first_name: Some("Ann".to_string()),
            ..Default::default()
        }
        .revokes_sessions());
    }

    #[test]
    fn test_identity_serializes_camel_case() {
        let identity = Identity::new("u1", "a@b.c", Role::Owner).in_organization(Some(1));
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["organizationId"], 1);
        assert_eq!(json["isActive"], true);
        assert_eq!(json["role"], "owner");
    }
}
