use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload; `organization_id` comes from the caller's resolved tenant.
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub organization_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BranchUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl Branch {
    pub fn apply(&mut self, update: &BranchUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if let Some(v) = &update.address {
            self.address = Some(v.clone());
        }
        if let Some(v) = &update.phone {
            self.phone = Some(v.clone());
        }
        if let Some(v) = &update.email {
            self.email = Some(v.clone());
        }
        if let Some(v) = update.is_active {
            self.is_active = v;
        }
        self.updated_at = Utc::now();
    }
}
