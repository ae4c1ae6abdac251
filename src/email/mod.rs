pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::models::ReminderKind;

/// Delivers a rendered HTML message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), String>;
}

pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.user.clone(), config.pass.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("System SMTP error: {e}"))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), String> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| format!("Invalid from address: {e}"))?,
            )
            .to(to.parse().map_err(|e| format!("Invalid to address: {e}"))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| format!("Failed to build email: {e}"))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| format!("Failed to send email: {e}"))?;

        Ok(())
    }
}

/// Stand-in when SMTP is not configured: the message is only logged.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), String> {
        tracing::warn!(to, subject, body = html_body, "System SMTP not configured, email not sent");
        Ok(())
    }
}

/// Pick the SMTP transport when configured, otherwise log-only.
pub fn transport_from_config(smtp: Option<&SmtpConfig>) -> Arc<dyn MailTransport> {
    match smtp.map(SmtpTransport::new) {
        Some(Ok(transport)) => {
            tracing::info!("System SMTP configured");
            Arc::new(transport)
        }
        Some(Err(e)) => {
            tracing::warn!("System SMTP not available: {e}");
            Arc::new(LogTransport)
        }
        None => Arc::new(LogTransport),
    }
}

/// The system's outgoing mail, rendered from [`templates`].
#[derive(Clone)]
pub struct SystemMailer {
    transport: Arc<dyn MailTransport>,
}

impl SystemMailer {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    pub async fn send_otp(
        &self,
        to_email: &str,
        to_name: &str,
        company_name: &str,
        otp: &str,
    ) -> Result<(), String> {
        let html = templates::render_otp(to_name, company_name, otp);
        self.transport
            .send(to_email, "Verify your email - HRMS", &html)
            .await
    }

    pub async fn send_password_reset(
        &self,
        to_email: &str,
        to_name: &str,
        reset_url: &str,
    ) -> Result<(), String> {
        let html = templates::render_password_reset(to_name, reset_url);
        self.transport
            .send(to_email, "Password Reset Request", &html)
            .await
    }

    pub async fn send_password_changed(&self, to_email: &str) -> Result<(), String> {
        let html = templates::render_password_changed();
        self.transport
            .send(to_email, "Password Reset Successful", &html)
            .await
    }

    pub async fn send_account_created(
        &self,
        to_email: &str,
        to_name: &str,
        company_name: &str,
        company_code: &str,
        temp_password: &str,
        login_url: &str,
    ) -> Result<(), String> {
        let html = templates::render_account_created(
            to_name,
            company_name,
            to_email,
            company_code,
            temp_password,
            login_url,
        );
        self.transport
            .send(to_email, "Your HRMS Account", &html)
            .await
    }

    pub async fn send_plan_reminder(
        &self,
        to_email: &str,
        company_name: &str,
        kind: ReminderKind,
        days_left: i64,
        plan_end_date: DateTime<Utc>,
        renew_url: &str,
    ) -> Result<(), String> {
        let (subject, html) =
            templates::render_plan_reminder(company_name, kind, days_left, plan_end_date, renew_url);
        self.transport.send(to_email, &subject, &html).await
    }
}
