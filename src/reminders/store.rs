use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{Company, ReminderKind};

/// Persistence used by the reminder scan.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Paid companies whose plan ends on or before `horizon`.
    async fn reminder_candidates(&self, horizon: DateTime<Utc>) -> Result<Vec<Company>, String>;

    /// Returns false if the kind was already recorded for this cycle.
    async fn record_reminder(
        &self,
        company_id: Uuid,
        kind: ReminderKind,
        cycle_end: DateTime<Utc>,
    ) -> Result<bool, String>;

    /// Companies past their plan end that are not yet flagged expired.
    async fn expired_unmarked(&self, now: DateTime<Utc>) -> Result<Vec<Company>, String>;

    /// Returns false if the company was already flagged.
    async fn mark_expired(&self, company_id: Uuid) -> Result<bool, String>;
}

pub struct PgReminderStore {
    pool: PgPool,
}

impl PgReminderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderStore for PgReminderStore {
    async fn reminder_candidates(&self, horizon: DateTime<Utc>) -> Result<Vec<Company>, String> {
        db::companies::list_reminder_candidates(&self.pool, horizon)
            .await
            .map_err(|e| format!("Failed to list reminder candidates: {e}"))
    }

    async fn record_reminder(
        &self,
        company_id: Uuid,
        kind: ReminderKind,
        cycle_end: DateTime<Utc>,
    ) -> Result<bool, String> {
        db::reminders::record(&self.pool, company_id, kind, cycle_end)
            .await
            .map_err(|e| format!("Failed to record {kind}: {e}"))
    }

    async fn expired_unmarked(&self, now: DateTime<Utc>) -> Result<Vec<Company>, String> {
        db::companies::list_expired_unmarked(&self.pool, now)
            .await
            .map_err(|e| format!("Failed to list expired companies: {e}"))
    }

    async fn mark_expired(&self, company_id: Uuid) -> Result<bool, String> {
        db::companies::mark_expired(&self.pool, company_id)
            .await
            .map_err(|e| format!("Failed to mark company expired: {e}"))
    }
}
