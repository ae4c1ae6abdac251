use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ReminderKind;

/// Record a sent reminder for the cycle ending at `cycle_end`.
/// Returns false when the kind was already recorded for that cycle.
pub async fn record(
    pool: &PgPool,
    company_id: Uuid,
    kind: ReminderKind,
    cycle_end: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO reminder_records (company_id, kind, cycle_end)
         VALUES ($1, $2, $3)
         ON CONFLICT (company_id, kind, cycle_end) DO NOTHING",
    )
    .bind(company_id)
    .bind(kind.as_str())
    .bind(cycle_end)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
