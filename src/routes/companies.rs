use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::gateway;
use crate::auth::{password, permissions};
use crate::db;
use crate::error::AppError;
use crate::routes::users::new_user_id;
use crate::state::SharedState;
use crate::tenancy::TenantCode;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCompanyRequest {
    pub company_name: String,
    pub company_code: String,
    pub contact_email: String,
    pub admin_name: String,
    pub admin_email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCompanyResponse {
    pub success: bool,
    pub message: String,
    pub company_code: String,
    pub requires_verification: bool,
}

/// Register a company with its first admin. The company stays inactive and
/// unpaid until the admin verifies their email and the payment completes.
pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterCompanyRequest>,
) -> Result<(StatusCode, Json<RegisterCompanyResponse>), AppError> {
    let company_name = req.company_name.trim();
    let admin_name = req.admin_name.trim();
    let contact_email = req.contact_email.trim().to_lowercase();
    let admin_email = req.admin_email.trim().to_lowercase();

    if company_name.is_empty()
        || admin_name.is_empty()
        || contact_email.is_empty()
        || admin_email.is_empty()
    {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    if !contact_email.contains('@') || !admin_email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    password::validate(&req.password).map_err(AppError::BadRequest)?;

    let code = TenantCode::parse(&req.company_code)?;

    if db::companies::exists(&state.pool, code.as_str()).await? {
        return Err(AppError::Conflict(
            "A company with this code already exists".to_string(),
        ));
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;
    let perms = permissions::for_role("admin");

    let mut tx = state.pool.begin().await?;
    let company = db::companies::create(&mut *tx, code.as_str(), company_name, &contact_email)
        .await
        .map_err(|e| {
            AppError::conflict_on_duplicate(e, "A company with this code already exists")
        })?;
    let admin = db::users::create(
        &mut *tx,
        &new_user_id(),
        code.as_str(),
        admin_name,
        &admin_email,
        &pw_hash,
        "admin",
        &perms,
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Company registered: {} ({})", company.name, company.company_code);

    gateway::issue_otp(&state, &admin, &company.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterCompanyResponse {
            success: true,
            message: "Company registered. A verification code has been sent to the admin email."
                .to_string(),
            company_code: company.company_code,
            requires_verification: true,
        }),
    ))
}
