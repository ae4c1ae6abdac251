pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod reminders;
pub mod routes;
pub mod state;
pub mod tenancy;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::email::{MailTransport, SystemMailer};
use crate::rate_limit::LoginRateLimiter;
use crate::reminders::ReminderScheduler;
use crate::reminders::store::PgReminderStore;
use crate::state::{AppState, SharedState};
use crate::tenancy::{PgConnector, TenantRouter};

/// Wire the registry pool, tenant router, mailer and reminder scheduler together.
pub fn build_state(pool: PgPool, config: Config, transport: Arc<dyn MailTransport>) -> SharedState {
    let connector = PgConnector::new(
        pool.clone(),
        config.database_url.clone(),
        config.tenant_db_prefix.clone(),
        config.tenant_max_connections,
    );
    let mailer = SystemMailer::new(transport);

    let reminders = Arc::new(ReminderScheduler::new(
        Arc::new(PgReminderStore::new(pool.clone())),
        mailer.clone(),
        config.reminders.super_admin_email.clone(),
        config.frontend_url.clone(),
    ));

    Arc::new(AppState {
        pool,
        tenants: TenantRouter::new(connector),
        mailer,
        login_limiter: LoginRateLimiter::new(),
        otp_limiter: LoginRateLimiter::new(),
        reminders,
        config,
    })
}

pub fn build_app(state: SharedState) -> Router {
    let cors = match HeaderValue::from_str(&state.config.frontend_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(e) => {
            tracing::warn!("Invalid frontend URL for CORS, cross-origin requests disabled: {e}");
            CorsLayer::new()
        }
    };

    // One `Router::layer` per middleware: each sees an `axum::body::Body` response.
    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
