//! Login and company eligibility.
//!
//! Every login first checks that the company may use the system at all
//! (exists, paid, plan not lapsed, active). Credentials are then checked
//! against the company's own user store, falling back to the main registry
//! for users who have not logged in yet. A registry user who logs in
//! successfully is copied into the company store.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::jwt::{Claims, encode_token};
use crate::auth::{password, tokens};
use crate::db;
use crate::error::AppError;
use crate::models::{Company, NewTenantUser, TenantUser, User};
use crate::state::AppState;
use crate::tenancy::TenantCode;

const OTP_MINUTES: i64 = 10;

/// Why a login (or company access) was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDenied {
    UnknownCompany,
    PaymentRequired {
        company_code: String,
        payment_link: String,
    },
    PlanExpired {
        company_code: String,
        plan_end_date: Option<DateTime<Utc>>,
    },
    CompanyInactive,
    VerificationRequired {
        email: String,
    },
    InvalidCredentials,
    SetupIncomplete,
    AccountInactive,
}

impl AccessDenied {
    pub fn status(&self) -> StatusCode {
        match self {
            AccessDenied::PaymentRequired { .. } | AccessDenied::PlanExpired { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            AccessDenied::VerificationRequired { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AccessDenied::UnknownCompany => "Invalid company code",
            AccessDenied::PaymentRequired { .. } => {
                "Company registration payment is pending. Please complete the payment to access the system."
            }
            AccessDenied::PlanExpired { .. } => {
                "Your company plan has expired. Please renew to continue using the system."
            }
            AccessDenied::CompanyInactive => "Company account is inactive",
            AccessDenied::VerificationRequired { .. } => {
                "Email not verified. A verification code has been sent to your email."
            }
            AccessDenied::InvalidCredentials => "Invalid email or password",
            AccessDenied::SetupIncomplete => {
                "Account setup incomplete. Please contact administrator."
            }
            AccessDenied::AccountInactive => {
                "Your account is inactive. Please contact your administrator."
            }
        }
    }

    pub fn body(&self) -> Value {
        let mut body = json!({ "success": false, "message": self.message() });
        match self {
            AccessDenied::PaymentRequired {
                company_code,
                payment_link,
            } => {
                body["requiresPayment"] = json!(true);
                body["companyCode"] = json!(company_code);
                body["paymentLink"] = json!(payment_link);
            }
            AccessDenied::PlanExpired {
                company_code,
                plan_end_date,
            } => {
                body["planExpired"] = json!(true);
                body["companyCode"] = json!(company_code);
                body["planEndDate"] = json!(plan_end_date);
            }
            AccessDenied::VerificationRequired { email } => {
                body["requiresVerification"] = json!(true);
                body["email"] = json!(email);
            }
            _ => {}
        }
        body
    }
}

/// Whether `company` may be used right now.
pub fn check_eligibility(
    company: &Company,
    now: DateTime<Utc>,
    frontend_url: &str,
) -> Result<(), AccessDenied> {
    if !company.payment_completed {
        return Err(AccessDenied::PaymentRequired {
            company_code: company.company_code.clone(),
            payment_link: format!("{frontend_url}/payment/{}", company.company_code),
        });
    }

    if company.is_payment_expired || company.plan_has_lapsed(now) {
        return Err(AccessDenied::PlanExpired {
            company_code: company.company_code.clone(),
            plan_end_date: company.plan_end_date,
        });
    }

    if !company.is_active {
        return Err(AccessDenied::CompanyInactive);
    }

    Ok(())
}

/// Load the company and check it may log in, flagging lapsed plans on the way.
pub async fn eligible_company(state: &AppState, code: &TenantCode) -> Result<Company, AppError> {
    let company = db::companies::find_by_code(&state.pool, code.as_str())
        .await?
        .ok_or(AccessDenied::UnknownCompany)?;

    if let Err(denied) = check_eligibility(&company, Utc::now(), &state.config.frontend_url) {
        if matches!(denied, AccessDenied::PlanExpired { .. }) && !company.is_payment_expired {
            db::companies::mark_expired(&state.pool, company.id).await?;
            tracing::info!("Marked {} as expired during login", company.company_code);
        }
        return Err(denied.into());
    }

    Ok(company)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub company_code: String,
    pub is_first_login: bool,
}

impl From<&TenantUser> for UserSummary {
    fn from(user: &TenantUser) -> Self {
        Self {
            id: user.id,
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            permissions: user.permissions.clone(),
            company_code: user.company_code.clone(),
            is_first_login: user.is_first_login,
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            permissions: user.permissions.clone(),
            company_code: user.company_code.clone(),
            is_first_login: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginSuccess {
    pub success: bool,
    pub token: String,
    pub user: UserSummary,
}

pub async fn login(
    state: &AppState,
    email: &str,
    password_input: &str,
    raw_code: &str,
) -> Result<LoginSuccess, AppError> {
    let code = TenantCode::parse(raw_code)?;
    let email = email.trim().to_lowercase();

    let limiter_key = format!("{code}:{email}");
    if state.login_limiter.check(&limiter_key).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let company = eligible_company(state, &code).await?;

    let tenant_pool = state.tenants.get_code(&code).await?;

    let outcome = match db::tenant_users::find_by_email(&tenant_pool, &email).await? {
        Some(user) => login_company_user(&tenant_pool, user, password_input).await,
        None => login_registry_user(state, &tenant_pool, &company, &email, password_input).await,
    };

    let (user, company_user) = match outcome {
        Ok(found) => found,
        Err(AppError::Denied(AccessDenied::InvalidCredentials)) => {
            state.login_limiter.record_failure(&limiter_key);
            return Err(AccessDenied::InvalidCredentials.into());
        }
        Err(e) => return Err(e),
    };

    let claims = Claims::new(user.id, code.to_string(), user.role.clone(), company_user);
    let token = encode_token(&claims, &state.config.jwt_secret).map_err(AppError::Internal)?;

    tracing::info!(
        company = %code,
        company_user,
        "Login successful for {}",
        user.email
    );

    Ok(LoginSuccess {
        success: true,
        token,
        user,
    })
}

async fn login_company_user(
    pool: &PgPool,
    user: TenantUser,
    password_input: &str,
) -> Result<(UserSummary, bool), AppError> {
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(AccessDenied::SetupIncomplete.into());
    };

    if !password::verify(password_input, hash).map_err(AppError::Internal)? {
        return Err(AccessDenied::InvalidCredentials.into());
    }

    if !user.is_active && !user.is_first_login {
        return Err(AccessDenied::AccountInactive.into());
    }

    let was_first_login = user.is_first_login;
    let user = db::tenant_users::record_login(pool, user.id).await?;
    if was_first_login {
        tracing::info!("First login completed for {}", user.email);
    }

    Ok((UserSummary::from(&user), true))
}

async fn login_registry_user(
    state: &AppState,
    tenant_pool: &PgPool,
    company: &Company,
    email: &str,
    password_input: &str,
) -> Result<(UserSummary, bool), AppError> {
    let user = db::users::find_by_email(&state.pool, &company.company_code, email)
        .await?
        .ok_or(AccessDenied::InvalidCredentials)?;

    if !password::verify(password_input, &user.password_hash).map_err(AppError::Internal)? {
        return Err(AccessDenied::InvalidCredentials.into());
    }

    if !user.is_verified {
        issue_otp(state, &user, &company.name).await?;
        return Err(AccessDenied::VerificationRequired {
            email: user.email.clone(),
        }
        .into());
    }

    if !user.is_active {
        return Err(AccessDenied::AccountInactive.into());
    }

    let new_user = NewTenantUser {
        user_id: &user.user_id,
        company_code: &user.company_code,
        name: &user.name,
        email: &user.email,
        password_hash: &user.password_hash,
        role: &user.role,
        permissions: &user.permissions,
        is_first_login: false,
    };

    match db::tenant_users::create(tenant_pool, &new_user).await {
        Ok(created) => {
            tracing::info!("User created in company database: {}", created.email);
            Ok((UserSummary::from(&created), true))
        }
        Err(e) => {
            tracing::error!("Error creating user in company database: {e}");
            Ok((UserSummary::from(&user), false))
        }
    }
}

/// Store a fresh OTP for `user` and mail it. Mail failures are only logged.
pub async fn issue_otp(state: &AppState, user: &User, company_name: &str) -> Result<(), AppError> {
    send_otp(state, user, company_name).await.or_else(|e| match e {
        OtpError::Mail(msg) => {
            tracing::error!("Error sending OTP email to {}: {msg}", user.email);
            Ok(())
        }
        OtpError::App(e) => Err(e),
    })
}

pub enum OtpError {
    App(AppError),
    Mail(String),
}

impl From<sqlx::Error> for OtpError {
    fn from(err: sqlx::Error) -> Self {
        OtpError::App(err.into())
    }
}

/// Store a fresh OTP for `user` and mail it, reporting mail failures separately.
pub async fn send_otp(state: &AppState, user: &User, company_name: &str) -> Result<(), OtpError> {
    let otp = tokens::generate_otp();
    let expires_at = Utc::now() + Duration::minutes(OTP_MINUTES);
    db::users::set_otp(&state.pool, user.id, &tokens::hash_token(&otp), expires_at).await?;

    state
        .mailer
        .send_otp(&user.email, &user.name, company_name, &otp)
        .await
        .map_err(OtpError::Mail)
}
