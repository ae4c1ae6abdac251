//! Users stored in a company's own database. Every function takes the pool
//! handed out by the tenant router.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewTenantUser, TenantUser};

pub async fn create(pool: &PgPool, user: &NewTenantUser<'_>) -> Result<TenantUser, sqlx::Error> {
    sqlx::query_as::<_, TenantUser>(
        "INSERT INTO users
             (user_id, company_code, name, email, password_hash, role, permissions, is_first_login,
              last_login)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                 CASE WHEN $8 THEN NULL ELSE now() END)
         RETURNING *",
    )
    .bind(user.user_id)
    .bind(user.company_code)
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.role)
    .bind(user.permissions)
    .bind(user.is_first_login)
    .fetch_one(pool)
    .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<TenantUser>, sqlx::Error> {
    sqlx::query_as::<_, TenantUser>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await
}

/// Stamp a successful login. The first login also activates the account.
pub async fn record_login(pool: &PgPool, id: Uuid) -> Result<TenantUser, sqlx::Error> {
    sqlx::query_as::<_, TenantUser>(
        "UPDATE users SET
             is_active = is_active OR is_first_login,
             is_first_login = false,
             last_login = now(),
             last_modified = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn set_reset_token(
    pool: &PgPool,
    email: &str,
    token_hash: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET reset_token_hash = $2, reset_expires_at = $3, last_modified = now()
         WHERE email = $1",
    )
    .bind(email)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_reset_token(
    pool: &PgPool,
    email: &str,
    token_hash: &str,
) -> Result<Option<TenantUser>, sqlx::Error> {
    sqlx::query_as::<_, TenantUser>(
        "SELECT * FROM users
         WHERE email = $1 AND reset_token_hash = $2 AND reset_expires_at > now()",
    )
    .bind(email)
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn update_password(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET password_hash = $2, reset_token_hash = NULL, reset_expires_at = NULL,
             last_modified = now()
         WHERE email = $1",
    )
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await?;
    Ok(())
}
