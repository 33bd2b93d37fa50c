use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::Identity;

/// Fields are optional so that absent values surface as 400, not a JSON rejection.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin@school.example")]
    pub email: Option<String>,
    #[schema(example = "correct horse battery staple")]
    pub password: Option<String>,
}

impl LoginRequest {
    /// Both fields, trimmed of surrounding whitespace and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((email, password))
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetupAdminRequest {
    #[schema(example = "owner@school.example")]
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetupAdminResponse {
    #[schema(example = "Admin user created successfully")]
    pub message: String,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LoginQuery {
    /// Where to send the browser after login. Unsafe targets fall back to `/`.
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
