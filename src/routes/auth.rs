use axum::Json;
use axum::extract::State;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::gateway::{self, LoginSuccess, OtpError};
use crate::auth::identity::Identity;
use crate::auth::{password, tokens};
use crate::db;
use crate::error::AppError;
use crate::state::SharedState;
use crate::tenancy::TenantCode;

const RESET_TOKEN_HOURS: i64 = 1;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub company_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
    pub company_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendOtpRequest {
    #[serde(default)]
    pub email: String,
    pub company_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company_code: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginSuccess>, AppError> {
    tracing::debug!(email = %req.email, company = %req.company_code, "Login attempt received");

    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    gateway::login(&state, &req.email, &req.password, &req.company_code)
        .await
        .map(Json)
}

pub async fn verify_email(
    State(state): State<SharedState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.trim().to_lowercase();

    let user = match req.company_code.as_deref() {
        Some(raw) => {
            let code = TenantCode::parse(raw)?;
            db::users::find_by_email(&state.pool, code.as_str(), &email).await?
        }
        None => db::users::find_latest_by_email(&state.pool, &email).await?,
    }
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.is_verified {
        return Err(AppError::BadRequest("Email is already verified".to_string()));
    }

    let limiter_key = format!("otp:{}:{}", user.company_code, user.email);
    if state.otp_limiter.check(&limiter_key).is_err() {
        return Err(AppError::RateLimited(
            "Too many verification attempts. Please try again later.".to_string(),
        ));
    }

    let (Some(otp_hash), Some(expires_at)) = (&user.otp_hash, user.otp_expires_at) else {
        return Err(AppError::BadRequest("Invalid OTP".to_string()));
    };

    if Utc::now() > expires_at {
        return Err(AppError::BadRequest("OTP has expired".to_string()));
    }

    if !tokens::constant_time_eq(&tokens::hash_token(req.otp.trim()), otp_hash) {
        state.otp_limiter.record_failure(&limiter_key);
        if state.otp_limiter.check(&limiter_key).is_err() {
            db::users::clear_otp(&state.pool, user.id).await?;
            tracing::warn!("Too many invalid OTPs for {}, code discarded", user.email);
        }
        return Err(AppError::BadRequest("Invalid OTP".to_string()));
    }

    db::users::mark_verified(&state.pool, user.id).await?;
    tracing::info!("User verified successfully: {}", user.email);

    if user.role == "admin" {
        activate_company(&state, &user).await?;
    }

    Ok(MessageResponse::ok("Email verified successfully"))
}

/// Activate the admin's company and provision the admin in the company database.
async fn activate_company(state: &SharedState, admin: &crate::models::User) -> Result<(), AppError> {
    let Some(company) = db::companies::find_by_code(&state.pool, &admin.company_code).await? else {
        return Ok(());
    };

    db::companies::activate(&state.pool, company.id).await?;
    tracing::info!("Company activated: {}", company.name);

    let provisioned = async {
        let pool = state.tenants.get(&company.company_code).await?;
        if db::tenant_users::exists(&pool, &admin.email).await? {
            return Ok::<_, AppError>(());
        }
        let new_user = crate::models::NewTenantUser {
            user_id: &admin.user_id,
            company_code: &admin.company_code,
            name: &admin.name,
            email: &admin.email,
            password_hash: &admin.password_hash,
            role: &admin.role,
            permissions: &admin.permissions,
            is_first_login: true,
        };
        db::tenant_users::create(&pool, &new_user).await?;
        Ok(())
    }
    .await;

    match provisioned {
        Ok(()) => tracing::info!("Admin user created in company database: {}", admin.email),
        Err(e) => tracing::error!("Error creating records in company database: {e}"),
    }
    Ok(())
}

pub async fn resend_otp(
    State(state): State<SharedState>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    let user = match req.company_code.as_deref() {
        Some(raw) => {
            let code = TenantCode::parse(raw)?;
            db::users::find_by_email(&state.pool, code.as_str(), &email).await?
        }
        None => db::users::find_latest_by_email(&state.pool, &email).await?,
    }
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.is_verified {
        return Err(AppError::BadRequest("Email is already verified".to_string()));
    }

    let company_name = db::companies::find_by_code(&state.pool, &user.company_code)
        .await?
        .map(|c| c.name)
        .unwrap_or_else(|| "HRMS".to_string());

    match gateway::send_otp(&state, &user, &company_name).await {
        Ok(()) => {
            tracing::info!("OTP resent to {}", user.email);
            Ok(MessageResponse::ok("OTP resent successfully"))
        }
        Err(OtpError::Mail(e)) => Err(AppError::Internal(format!(
            "Error sending OTP email to {}: {e}",
            user.email
        ))),
        Err(OtpError::App(e)) => Err(e),
    }
}

pub async fn forgot_password(
    State(state): State<SharedState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.company_code.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Email and company code are required".to_string(),
        ));
    }
    let code = TenantCode::parse(&req.company_code)?;

    let identity = Identity::find(&state, &code, &email).await?.ok_or_else(|| {
        AppError::NotFound("User not found with this email and company code".to_string())
    })?;

    let token = tokens::generate_token();
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_HOURS);
    identity
        .set_reset_token(&state.pool, Some(&tokens::hash_token(&token)), Some(expires_at))
        .await?;

    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("email", &identity.email)
        .append_pair("companyCode", code.as_str())
        .finish();
    let reset_url = format!("{}/reset-password/{token}?{query}", state.config.frontend_url);

    if let Err(e) = state
        .mailer
        .send_password_reset(&identity.email, &identity.name, &reset_url)
        .await
    {
        identity.set_reset_token(&state.pool, None, None).await?;
        return Err(AppError::Internal(format!(
            "Error sending password reset email: {e}"
        )));
    }

    tracing::info!("Password reset email sent to {}", identity.email);
    Ok(MessageResponse::ok("Password reset link sent to your email"))
}

pub async fn reset_password(
    State(state): State<SharedState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if req.token.is_empty()
        || req.email.trim().is_empty()
        || req.company_code.trim().is_empty()
        || req.password.is_empty()
    {
        return Err(AppError::BadRequest(
            "Token, email, company code, and new password are required".to_string(),
        ));
    }
    password::validate(&req.password).map_err(AppError::BadRequest)?;

    let code = TenantCode::parse(&req.company_code)?;
    let email = req.email.trim().to_lowercase();
    let token_hash = tokens::hash_token(&req.token);

    let identity = Identity::find_by_reset_token(&state, &code, &email, &token_hash)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired token".to_string()))?;

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;
    identity.set_password(&state.pool, &pw_hash).await?;
    tracing::info!("Password reset for {} ({:?} record)", identity.email, identity.primary);

    if let Err(e) = state.mailer.send_password_changed(&identity.email).await {
        tracing::error!("Error sending confirmation email: {e}");
    }

    Ok(MessageResponse::ok("Password has been reset successfully"))
}
