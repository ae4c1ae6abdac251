pub mod admin;
pub mod auth;
pub mod companies;
pub mod users;

use axum::Router;
use axum::routing::post;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/verify-email", post(auth::verify_email))
        .route("/api/v1/auth/resend-otp", post(auth::resend_otp))
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(auth::reset_password))
        // Companies
        .route("/api/v1/companies/register", post(companies::register))
        // Users
        .route("/api/v1/users", post(users::create))
        // Admin
        .route("/api/v1/admin/reminders/run", post(admin::run_reminders))
}
