use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ReminderKind;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub company_code: String,
    pub name: String,
    pub contact_email: String,
    pub is_active: bool,
    pub pending_verification: bool,
    pub payment_completed: bool,
    pub plan_start_date: Option<DateTime<Utc>>,
    pub plan_end_date: Option<DateTime<Utc>>,
    pub is_payment_expired: bool,
    /// Reminder kinds already sent for the current plan end date.
    pub reminders_sent: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Whole days until the plan ends, rounded up. `None` without a plan.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.plan_end_date.map(|end| days_until(end, now))
    }

    pub fn plan_has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.plan_end_date.is_some_and(|end| now > end)
    }

    pub fn has_reminder_been_sent(&self, kind: ReminderKind) -> bool {
        self.reminders_sent.iter().any(|k| k == kind.as_str())
    }
}

/// Days from `now` to `end`, rounded towards the later day.
pub fn days_until(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    let days = secs.div_euclid(SECONDS_PER_DAY);
    if secs.rem_euclid(SECONDS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 3, 30, 0).unwrap()
    }

    #[test]
    fn partial_days_round_up() {
        assert_eq!(days_until(now() + Duration::hours(15), now()), 1);
        assert_eq!(days_until(now() + Duration::days(1), now()), 1);
        assert_eq!(days_until(now() + Duration::days(4) + Duration::minutes(1), now()), 5);
    }

    #[test]
    fn past_end_is_zero_or_negative() {
        assert_eq!(days_until(now(), now()), 0);
        assert_eq!(days_until(now() - Duration::seconds(1), now()), 0);
        assert_eq!(days_until(now() - Duration::days(2), now()), -2);
    }
}
