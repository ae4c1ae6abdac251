use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::ReminderScheduler;

const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Fires once a day at a wall-clock time in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct DailySchedule {
    pub time: NaiveTime,
    pub utc_offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(time: NaiveTime, utc_offset: FixedOffset) -> Self {
        Self { time, utc_offset }
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.utc_offset);
        let today = local
            .date_naive()
            .and_time(self.time)
            .and_local_timezone(self.utc_offset)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);

        if today > now {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }
}

/// Run the reminder scan on `schedule` until `shutdown` flips to true.
pub fn spawn_scheduler(
    scheduler: Arc<ReminderScheduler>,
    schedule: DailySchedule,
    run_on_startup: bool,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Plan expiry reminder scheduler started (daily at {} UTC{})",
            schedule.time.format("%H:%M"),
            schedule.utc_offset
        );

        if run_on_startup {
            tracing::info!("Running initial expiry check in {}s", STARTUP_DELAY.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(STARTUP_DELAY) => {
                    scheduler.run_now().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!("Next plan expiry check at {next}");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    tracing::info!("Running scheduled plan expiry reminder check");
                    scheduler.run_now().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Plan expiry reminder scheduler stopped");
    })
}
