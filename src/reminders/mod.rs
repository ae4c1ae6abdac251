//! Plan expiry reminders.
//!
//! Once a day every paid company whose plan is about to end (or has ended)
//! is checked against three milestones: five days left, one day left, and
//! expired. Each milestone is mailed at most once per billing cycle, and at
//! most one milestone fires per company per run. A cleanup pass then flags
//! lapsed plans as expired.

pub mod schedule;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::email::SystemMailer;
use crate::models::{Company, ReminderKind};

pub use schedule::{DailySchedule, spawn_scheduler};
pub use store::{PgReminderStore, ReminderStore};

/// Companies ending within this many days are loaded for a run.
const LOOKAHEAD_DAYS: i64 = 6;

/// The milestone to send for a company with `days_left`, if any.
///
/// Checked in the order expiry, one day, five days; the first unsent match
/// wins.
pub fn due_reminder(days_left: i64, company: &Company) -> Option<ReminderKind> {
    if days_left <= 0 && !company.has_reminder_been_sent(ReminderKind::Expiry) {
        return Some(ReminderKind::Expiry);
    }
    if days_left == 1 && !company.has_reminder_been_sent(ReminderKind::OneDay) {
        return Some(ReminderKind::OneDay);
    }
    if days_left == 5 && !company.has_reminder_been_sent(ReminderKind::FiveDay) {
        return Some(ReminderKind::FiveDay);
    }
    None
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentReminder {
    pub company_code: String,
    pub kind: ReminderKind,
    pub days_left: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub candidates: usize,
    pub sent: Vec<SentReminder>,
    pub failed: Vec<String>,
    pub marked_expired: Vec<String>,
}

pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    mailer: SystemMailer,
    super_admin_email: Option<String>,
    frontend_url: String,
    running: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        mailer: SystemMailer,
        super_admin_email: Option<String>,
        frontend_url: String,
    ) -> Self {
        if super_admin_email.is_none() {
            tracing::warn!(
                "HRMS_SUPER_ADMIN_EMAIL not configured - plan expiry reminders will not be copied to an admin"
            );
        }
        Self {
            store,
            mailer,
            super_admin_email,
            frontend_url,
            running: Mutex::new(()),
        }
    }

    /// Run a scan now. Returns `None` if another scan is still in progress.
    pub async fn run_now(&self) -> Option<RunReport> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Option<RunReport> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Plan expiry check already running, skipping this run");
            return None;
        };

        tracing::info!("Starting plan expiry reminder check");
        let mut report = RunReport::default();

        match self
            .store
            .reminder_candidates(now + Duration::days(LOOKAHEAD_DAYS))
            .await
        {
            Ok(companies) => {
                report.candidates = companies.len();
                tracing::info!("Found {} companies needing reminders", companies.len());

                for company in &companies {
                    match self.process_company(company, now).await {
                        Ok(Some(sent)) => {
                            tracing::info!(
                                "Sent {} to {} ({} days left)",
                                sent.kind,
                                company.name,
                                sent.days_left
                            );
                            report.sent.push(sent);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(
                                "Error processing reminders for {}: {e}",
                                company.company_code
                            );
                            report.failed.push(company.company_code.clone());
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("Plan expiry reminder check failed: {e}");
                return Some(report);
            }
        }

        self.mark_expired_companies(now, &mut report).await;

        tracing::info!(
            sent = report.sent.len(),
            failed = report.failed.len(),
            marked_expired = report.marked_expired.len(),
            "Plan expiry reminder check completed"
        );
        Some(report)
    }

    async fn process_company(
        &self,
        company: &Company,
        now: DateTime<Utc>,
    ) -> Result<Option<SentReminder>, String> {
        let Some(plan_end) = company.plan_end_date else {
            return Ok(None);
        };
        let days_left = company.days_until_expiry(now).unwrap_or_default();

        let Some(kind) = due_reminder(days_left, company) else {
            return Ok(None);
        };

        let renew_url = format!("{}/payment/{}", self.frontend_url, company.company_code);
        self.mailer
            .send_plan_reminder(
                &company.contact_email,
                &company.name,
                kind,
                days_left,
                plan_end,
                &renew_url,
            )
            .await?;

        if let Some(admin) = &self.super_admin_email {
            if let Err(e) = self
                .mailer
                .send_plan_reminder(admin, &company.name, kind, days_left, plan_end, &renew_url)
                .await
            {
                tracing::warn!("Failed to copy {kind} for {} to admin: {e}", company.company_code);
            }
        }

        if !self.store.record_reminder(company.id, kind, plan_end).await? {
            tracing::warn!(
                "{kind} for {} was recorded concurrently",
                company.company_code
            );
        }

        Ok(Some(SentReminder {
            company_code: company.company_code.clone(),
            kind,
            days_left,
        }))
    }

    async fn mark_expired_companies(&self, now: DateTime<Utc>, report: &mut RunReport) {
        let companies = match self.store.expired_unmarked(now).await {
            Ok(companies) => companies,
            Err(e) => {
                tracing::error!("Failed to load expired companies: {e}");
                return;
            }
        };
        tracing::info!("Found {} expired companies to process", companies.len());

        for company in companies {
            match self.store.mark_expired(company.id).await {
                Ok(true) => {
                    tracing::info!("Marked {} as expired", company.name);
                    report.marked_expired.push(company.company_code);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Error marking {} as expired: {e}", company.company_code);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::email::MailTransport;

    #[derive(Default)]
    struct MemoryStore {
        companies: StdMutex<Vec<Company>>,
        /// (company_id, kind, cycle_end)
        records: StdMutex<HashSet<(Uuid, ReminderKind, DateTime<Utc>)>>,
        fail_listing: bool,
    }

    impl MemoryStore {
        fn with(companies: Vec<Company>) -> Self {
            Self {
                companies: StdMutex::new(companies),
                ..Default::default()
            }
        }

        fn company(&self, code: &str) -> Company {
            self.companies
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.company_code == code)
                .cloned()
                .unwrap()
        }

        /// Mirrors the SQL view: sent kinds for the current plan end only.
        fn hydrate(&self, mut company: Company) -> Company {
            let records = self.records.lock().unwrap();
            company.reminders_sent = records
                .iter()
                .filter(|(id, _, end)| *id == company.id && Some(*end) == company.plan_end_date)
                .map(|(_, kind, _)| kind.as_str().to_string())
                .collect();
            company
        }
    }

    #[async_trait]
    impl ReminderStore for MemoryStore {
        async fn reminder_candidates(&self, horizon: DateTime<Utc>) -> Result<Vec<Company>, String> {
            if self.fail_listing {
                return Err("connection reset".to_string());
            }
            let companies = self.companies.lock().unwrap().clone();
            Ok(companies
                .into_iter()
                .filter(|c| c.payment_completed && c.plan_end_date.is_some_and(|end| end <= horizon))
                .map(|c| self.hydrate(c))
                .collect())
        }

        async fn record_reminder(
            &self,
            company_id: Uuid,
            kind: ReminderKind,
            cycle_end: DateTime<Utc>,
        ) -> Result<bool, String> {
            Ok(self.records.lock().unwrap().insert((company_id, kind, cycle_end)))
        }

        async fn expired_unmarked(&self, now: DateTime<Utc>) -> Result<Vec<Company>, String> {
            let companies = self.companies.lock().unwrap().clone();
            Ok(companies
                .into_iter()
                .filter(|c| !c.is_payment_expired && c.plan_end_date.is_some_and(|end| end < now))
                .collect())
        }

        async fn mark_expired(&self, company_id: Uuid) -> Result<bool, String> {
            let mut companies = self.companies.lock().unwrap();
            let company = companies
                .iter_mut()
                .find(|c| c.id == company_id)
                .ok_or("unknown company")?;
            let changed = !company.is_payment_expired;
            company.is_payment_expired = true;
            Ok(changed)
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<(String, String)>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), String> {
            if self.fail_for.as_deref() == Some(to) {
                return Err("SMTP timeout".to_string());
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 3, 30, 0).unwrap()
    }

    fn company(code: &str, plan_end: DateTime<Utc>) -> Company {
        Company {
            id: Uuid::now_v7(),
            company_code: code.to_string(),
            name: format!("{code} Ltd"),
            contact_email: format!("billing@{}.test", code.to_lowercase()),
            is_active: true,
            pending_verification: false,
            payment_completed: true,
            plan_start_date: Some(plan_end - Duration::days(365)),
            plan_end_date: Some(plan_end),
            is_payment_expired: false,
            reminders_sent: Vec::new(),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn scheduler(
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        admin: Option<&str>,
    ) -> ReminderScheduler {
        ReminderScheduler::new(
            store,
            SystemMailer::new(transport),
            admin.map(str::to_string),
            "http://hrms.test".to_string(),
        )
    }

    #[test]
    fn expiry_wins_tie_break() {
        let mut c = company("ACME", now());
        assert_eq!(due_reminder(0, &c), Some(ReminderKind::Expiry));
        c.reminders_sent = vec!["expiry_notification".to_string()];
        assert_eq!(due_reminder(0, &c), None);
        assert_eq!(due_reminder(1, &c), Some(ReminderKind::OneDay));
        assert_eq!(due_reminder(5, &c), Some(ReminderKind::FiveDay));
        assert_eq!(due_reminder(3, &c), None);
    }

    #[tokio::test]
    async fn five_day_reminder_is_sent_once() {
        let store = Arc::new(MemoryStore::with(vec![company(
            "ACME",
            now() + Duration::days(5),
        )]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store.clone(), transport.clone(), None);

        let first = scheduler.run_at(now()).await.unwrap();
        assert_eq!(first.sent.len(), 1);
        assert_eq!(first.sent[0].kind, ReminderKind::FiveDay);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let second = scheduler.run_at(now() + Duration::hours(1)).await.unwrap();
        assert!(second.sent.is_empty());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plan_ending_tomorrow_gets_only_one_day_reminder() {
        let store = Arc::new(MemoryStore::with(vec![company(
            "ACME",
            now() + Duration::days(1),
        )]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store.clone(), transport.clone(), None);

        let report = scheduler.run_at(now()).await.unwrap();

        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].kind, ReminderKind::OneDay);
        let acme = store.hydrate(store.company("ACME"));
        assert_eq!(acme.reminders_sent, vec!["1_day_reminder".to_string()]);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "billing@acme.test");
        assert!(sent[0].1.contains("tomorrow"));
    }

    #[tokio::test]
    async fn lapsed_plan_gets_expiry_notice_and_is_marked_once() {
        let store = Arc::new(MemoryStore::with(vec![company(
            "ACME",
            now() - Duration::days(1),
        )]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store.clone(), transport.clone(), None);

        let first = scheduler.run_at(now()).await.unwrap();
        assert_eq!(first.sent.len(), 1);
        assert_eq!(first.sent[0].kind, ReminderKind::Expiry);
        assert_eq!(first.marked_expired, vec!["ACME".to_string()]);
        assert!(store.company("ACME").is_payment_expired);

        let second = scheduler.run_at(now()).await.unwrap();
        assert!(second.sent.is_empty());
        assert!(second.marked_expired.is_empty());
    }

    #[tokio::test]
    async fn renewal_starts_a_new_cycle() {
        let store = Arc::new(MemoryStore::with(vec![company(
            "ACME",
            now() + Duration::days(5),
        )]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store.clone(), transport.clone(), None);
        scheduler.run_at(now()).await.unwrap();

        // Renewed for another year; five days before the new end date.
        let new_end = now() + Duration::days(370);
        store.companies.lock().unwrap()[0].plan_end_date = Some(new_end);
        let report = scheduler
            .run_at(new_end - Duration::days(5))
            .await
            .unwrap();

        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].kind, ReminderKind::FiveDay);
    }

    #[tokio::test]
    async fn one_failing_company_does_not_block_others() {
        let store = Arc::new(MemoryStore::with(vec![
            company("ACME", now() + Duration::days(1)),
            company("GLOBEX", now() + Duration::days(1)),
        ]));
        let transport = Arc::new(RecordingTransport {
            fail_for: Some("billing@acme.test".to_string()),
            ..Default::default()
        });
        let scheduler = scheduler(store.clone(), transport.clone(), None);

        let report = scheduler.run_at(now()).await.unwrap();

        assert_eq!(report.failed, vec!["ACME".to_string()]);
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].company_code, "GLOBEX");
        // Not recorded, so the next run retries.
        assert!(store.hydrate(store.company("ACME")).reminders_sent.is_empty());
    }

    #[tokio::test]
    async fn admin_receives_a_copy() {
        let store = Arc::new(MemoryStore::with(vec![company(
            "ACME",
            now() + Duration::days(5),
        )]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store, transport.clone(), Some("owner@hrms.test"));

        scheduler.run_at(now()).await.unwrap();

        let recipients: Vec<String> = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect();
        assert_eq!(recipients, vec!["billing@acme.test", "owner@hrms.test"]);
    }

    #[tokio::test]
    async fn unpaid_and_distant_plans_are_ignored() {
        let mut unpaid = company("UNPAID", now() + Duration::days(1));
        unpaid.payment_completed = false;
        let store = Arc::new(MemoryStore::with(vec![
            unpaid,
            company("LATER", now() + Duration::days(30)),
            company("MIDWAY", now() + Duration::days(3)),
        ]));
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(store, transport.clone(), None);

        let report = scheduler.run_at(now()).await.unwrap();

        assert_eq!(report.candidates, 1);
        assert!(report.sent.is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_contained() {
        let store = Arc::new(MemoryStore {
            fail_listing: true,
            ..Default::default()
        });
        let scheduler = scheduler(store, Arc::new(RecordingTransport::default()), None);

        let report = scheduler.run_at(now()).await.unwrap();
        assert_eq!(report.candidates, 0);
        assert!(report.sent.is_empty());
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = scheduler(store, Arc::new(RecordingTransport::default()), None);

        let _held = scheduler.running.lock().await;
        assert!(scheduler.run_at(now()).await.is_none());
    }
}
