//! Main registry users.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;

#[allow(clippy::too_many_arguments)]
pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    user_id: &str,
    company_code: &str,
    name: &str,
    email: &str,
    password_hash: &str,
    role: &str,
    permissions: &[String],
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (user_id, company_code, name, email, password_hash, role, permissions)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(user_id)
    .bind(company_code)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(permissions)
    .fetch_one(executor)
    .await
}

pub async fn find_by_email(
    pool: &PgPool,
    company_code: &str,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE company_code = $1 AND email = $2")
        .bind(company_code)
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Latest registry row for an email across companies, unverified rows first.
pub async fn find_latest_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1
         ORDER BY is_verified ASC, created_at DESC LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn set_otp(
    pool: &PgPool,
    id: Uuid,
    otp_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET otp_hash = $2, otp_expires_at = $3, last_modified = now() WHERE id = $1",
    )
    .bind(id)
    .bind(otp_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_verified(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET is_verified = true, otp_hash = NULL, otp_expires_at = NULL,
             last_modified = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Discard the pending verification code.
pub async fn clear_otp(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET otp_hash = NULL, otp_expires_at = NULL, last_modified = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Set or clear the reset token of the row for `(company_code, email)`.
pub async fn set_reset_token(
    pool: &PgPool,
    company_code: &str,
    email: &str,
    token_hash: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET reset_token_hash = $3, reset_expires_at = $4, last_modified = now()
         WHERE company_code = $1 AND email = $2",
    )
    .bind(company_code)
    .bind(email)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_reset_token(
    pool: &PgPool,
    company_code: &str,
    email: &str,
    token_hash: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE company_code = $1 AND email = $2
           AND reset_token_hash = $3 AND reset_expires_at > now()",
    )
    .bind(company_code)
    .bind(email)
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

/// Replace the password and consume any outstanding reset token.
pub async fn update_password(
    pool: &PgPool,
    company_code: &str,
    email: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET password_hash = $3, reset_token_hash = NULL, reset_expires_at = NULL,
             last_modified = now()
         WHERE company_code = $1 AND email = $2",
    )
    .bind(company_code)
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await?;
    Ok(())
}
