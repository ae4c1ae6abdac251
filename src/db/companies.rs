use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Company;

/// Company columns plus the reminder kinds recorded for the current plan end.
const SELECT_COMPANY: &str = "SELECT c.*,
        ARRAY(SELECT r.kind FROM reminder_records r
              WHERE r.company_id = c.id AND r.cycle_end = c.plan_end_date
              ORDER BY r.sent_at) AS reminders_sent
    FROM companies c";

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    company_code: &str,
    name: &str,
    contact_email: &str,
) -> Result<Company, sqlx::Error> {
    sqlx::query_as::<_, Company>(
        "INSERT INTO companies (company_code, name, contact_email)
         VALUES ($1, $2, $3) RETURNING *, '{}'::text[] AS reminders_sent",
    )
    .bind(company_code)
    .bind(name)
    .bind(contact_email)
    .fetch_one(executor)
    .await
}

pub async fn find_by_code(pool: &PgPool, company_code: &str) -> Result<Option<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>(&format!("{SELECT_COMPANY} WHERE c.company_code = $1"))
        .bind(company_code)
        .fetch_optional(pool)
        .await
}

pub async fn exists(pool: &PgPool, company_code: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM companies WHERE company_code = $1)")
        .bind(company_code)
        .fetch_one(pool)
        .await
}

/// Paid companies whose plan ends on or before `horizon`, including lapsed ones.
pub async fn list_reminder_candidates(
    pool: &PgPool,
    horizon: DateTime<Utc>,
) -> Result<Vec<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>(&format!(
        "{SELECT_COMPANY}
         WHERE c.payment_completed = true
           AND c.plan_end_date IS NOT NULL
           AND c.plan_end_date <= $1
         ORDER BY c.plan_end_date"
    ))
    .bind(horizon)
    .fetch_all(pool)
    .await
}

pub async fn list_expired_unmarked(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>(&format!(
        "{SELECT_COMPANY}
         WHERE c.is_payment_expired = false
           AND c.plan_end_date IS NOT NULL
           AND c.plan_end_date < $1
         ORDER BY c.plan_end_date"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
}

/// Flag the plan as expired. Returns false if it was already flagged.
pub async fn mark_expired(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE companies SET is_payment_expired = true, updated_at = now()
         WHERE id = $1 AND is_payment_expired = false",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn activate(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE companies SET is_active = true, pending_verification = false, updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
