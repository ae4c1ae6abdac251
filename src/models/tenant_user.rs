use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user row in a company's own database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: Uuid,
    pub user_id: String,
    pub company_code: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_first_login: bool,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

pub struct NewTenantUser<'a> {
    pub user_id: &'a str,
    pub company_code: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub permissions: &'a [String],
    pub is_first_login: bool,
}
