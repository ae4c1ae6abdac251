use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::auth::{password, permissions, tokens};
use crate::db;
use crate::error::AppError;
use crate::models::NewTenantUser;
use crate::state::SharedState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub success: bool,
    pub message: String,
    pub user_id: String,
}

/// Human-readable id shown in the HR screens, e.g. `USER-7F3A9C21`.
pub fn new_user_id() -> String {
    let id = Uuid::now_v7().simple().to_string();
    format!("USER-{}", id[id.len() - 8..].to_uppercase())
}

/// Create an employee account in the caller's company with a temporary password.
pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    auth.require_role(&["admin", "hr"])?;

    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let email = req.email.trim().to_lowercase();
    if first_name.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest(
            "First name and email are required".to_string(),
        ));
    }
    if !permissions::is_valid_role(&req.role) {
        return Err(AppError::BadRequest(format!("Unknown role: {}", req.role)));
    }

    let pool = state.tenants.get(&auth.company_code).await?;

    if db::tenant_users::exists(&pool, &email).await? {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }
    if db::users::find_by_email(&state.pool, &auth.company_code, &email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "User with this email already exists in main database".to_string(),
        ));
    }

    let temp_password = tokens::generate_temp_password();
    let pw_hash = password::hash(&temp_password).map_err(AppError::Internal)?;
    let name = format!("{first_name} {last_name}").trim().to_string();
    let user_id = new_user_id();
    let perms = permissions::for_role(&req.role);

    let user = db::tenant_users::create(
        &pool,
        &NewTenantUser {
            user_id: &user_id,
            company_code: &auth.company_code,
            name: &name,
            email: &email,
            password_hash: &pw_hash,
            role: &req.role,
            permissions: &perms,
            is_first_login: true,
        },
    )
    .await
    .map_err(|e| AppError::conflict_on_duplicate(e, "User with this email already exists"))?;

    tracing::info!(
        company = %auth.company_code,
        created_by = %auth.user_id,
        "User {} created with role {}",
        user.email,
        user.role
    );

    let company_name = db::companies::find_by_code(&state.pool, &auth.company_code)
        .await?
        .map(|c| c.name)
        .unwrap_or_else(|| "our HRMS system".to_string());
    let login_url = format!("{}/login", state.config.frontend_url);

    if let Err(e) = state
        .mailer
        .send_account_created(
            &user.email,
            &user.name,
            &company_name,
            &auth.company_code,
            &temp_password,
            &login_url,
        )
        .await
    {
        tracing::error!("Error sending invitation email to {}: {e}", user.email);
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            success: true,
            message: "User created successfully".to_string(),
            user_id: user.user_id,
        }),
    ))
}
