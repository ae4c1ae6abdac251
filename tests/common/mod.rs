#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use hrms_core::config::{Config, Environment, ReminderConfig};
use hrms_core::email::MailTransport;
use hrms_core::state::SharedState;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const SUPER_ADMIN: &str = "owner@hrms.test";

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures outgoing mail so tests can read OTPs, reset links and temporary passwords.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMail>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), String> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

impl RecordingTransport {
    pub fn all(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.all().into_iter().rev().find(|m| m.to == to)
    }
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: std::net::SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub tenant_prefix: String,
    pub state: SharedState,
    pub mail: Arc<RecordingTransport>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a JSON body, return (body, status).
    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Register a company with `admin@<code>.test` / `password123` as its admin.
    pub async fn register_company(&self, code: &str, name: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/companies/register",
            &json!({
                "companyName": name,
                "companyCode": code,
                "contactEmail": contact_email(code),
                "adminName": "Admin",
                "adminEmail": admin_email(code),
                "password": "password123",
            }),
        )
        .await
    }

    pub async fn login(&self, code: &str, email: &str, password: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/login",
            &json!({ "email": email, "password": password, "companyCode": code }),
        )
        .await
    }

    /// Mark the company paid with a plan ending at `plan_end`.
    pub async fn set_plan(&self, code: &str, plan_end: DateTime<Utc>) {
        sqlx::query(
            "UPDATE companies SET payment_completed = true, is_payment_expired = false, \
             plan_start_date = now(), plan_end_date = $2 WHERE company_code = $1",
        )
        .bind(code)
        .bind(plan_end)
        .execute(&self.pool)
        .await
        .expect("set plan failed");
    }

    /// The OTP from the latest verification mail sent to `to`.
    pub fn last_otp(&self, to: &str) -> String {
        let mail = self.mail.last_to(to).expect("no mail sent");
        let marker = "font-weight: bold;\">";
        let start = mail.body.find(marker).expect("no otp in mail") + marker.len();
        mail.body[start..start + 6].to_string()
    }

    /// The reset token from the latest password reset mail sent to `to`.
    pub fn last_reset_token(&self, to: &str) -> String {
        let mail = self.mail.last_to(to).expect("no mail sent");
        let marker = "/reset-password/";
        let start = mail.body.find(marker).expect("no reset link in mail") + marker.len();
        let rest = &mail.body[start..];
        rest[..rest.find('?').expect("reset link has no query")].to_string()
    }

    /// The temporary password from the latest account mail sent to `to`.
    pub fn last_temp_password(&self, to: &str) -> String {
        let mail = self.mail.last_to(to).expect("no mail sent");
        let marker = "Temporary Password: ";
        let start = mail.body.find(marker).expect("no password in mail") + marker.len();
        let rest = &mail.body[start..];
        rest[..rest.find("</li>").unwrap()].to_string()
    }

    /// Register, pay and verify a company, then log its admin in. Returns the token.
    pub async fn active_company(&self, code: &str, plan_end: DateTime<Utc>) -> String {
        let (body, status) = self.register_company(code, &format!("{code} Ltd")).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        self.set_plan(code, plan_end).await;

        let email = admin_email(code);
        let otp = self.last_otp(&email);
        let (body, status) = self
            .post(
                "/api/v1/auth/verify-email",
                &json!({ "email": email, "otp": otp, "companyCode": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {body}");

        let (body, status) = self.login(code, &email, "password123").await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }
}

pub fn admin_email(code: &str) -> String {
    format!("admin@{}.test", code.to_lowercase())
}

pub fn contact_email(code: &str) -> String {
    format!("billing@{}.test", code.to_lowercase())
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Spawn a test app with a fresh temporary database.
pub async fn spawn_app() -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let suffix = Uuid::now_v7().simple().to_string();
    let db_name = format!("hrms_test_{suffix}");
    let tenant_prefix = format!("hrms_test_{}_", &suffix[suffix.len() - 10..]);

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        frontend_url: "http://localhost:3000".to_string(),
        environment: Environment::Development,
        tenant_db_prefix: tenant_prefix.clone(),
        tenant_max_connections: 2,
        max_body_size: 1_048_576,
        log_level: "warn".to_string(),
        smtp: None,
        reminders: ReminderConfig {
            super_admin_email: Some(SUPER_ADMIN.to_string()),
            time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            utc_offset: chrono::FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
            run_on_startup: false,
        },
        admin_api_key: Some(ADMIN_KEY.to_string()),
    };

    let mail = Arc::new(RecordingTransport::default());
    let state = hrms_core::build_state(pool.clone(), config, mail.clone());
    let app = hrms_core::build_app(state.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        pool,
        client: Client::new(),
        db_name,
        tenant_prefix,
        state,
        mail,
    }
}

/// Drop the test database and every company database it provisioned.
pub async fn cleanup(app: TestApp) {
    app.state.tenants.shutdown().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let tenant_dbs = sqlx::query_scalar::<_, String>(
        "SELECT datname FROM pg_database WHERE starts_with(datname, $1)",
    )
    .bind(&app.tenant_prefix)
    .fetch_all(&admin_pool)
    .await
    .unwrap_or_default();

    for db_name in tenant_dbs.into_iter().chain([app.db_name.clone()]) {
        let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
            .execute(&admin_pool)
            .await;
    }

    admin_pool.close().await;
}
