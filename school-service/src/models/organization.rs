use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A tenant. Organizations are the unit of isolation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub plan: String,
    pub max_branches: i32,
    pub max_users: i32,
    pub settings: serde_json::Value,
    pub billing_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id,
            slug: slugify(&name, id),
            name,
            domain: None,
            plan: "starter".to_string(),
            max_branches: 1,
            max_users: 50,
            settings: serde_json::json!({}),
            billing_email: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: &OrganizationUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if let Some(v) = &update.domain {
            self.domain = Some(v.clone());
        }
        if let Some(v) = &update.billing_email {
            self.billing_email = Some(v.clone());
        }
        self.updated_at = Utc::now();
    }
}

fn slugify(name: &str, id: i64) -> String {
    let base: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let base = base.trim_matches('-');
    if base.is_empty() {
        format!("org-{}", id)
    } else {
        format!("{}-{}", base, id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub domain: Option<String>,
    #[validate(email)]
    pub billing_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_unique_per_id() {
        let org = Organization::new(7, "Green Valley School");
        assert_eq!(org.slug, "green-valley-school-7");
        assert_eq!(Organization::new(3, "!!").slug, "org-3");
    }
}
