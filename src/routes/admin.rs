use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use crate::auth::tokens;
use crate::error::AppError;
use crate::reminders::RunReport;
use crate::state::SharedState;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

fn require_admin_key(state: &SharedState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.admin_api_key.as_deref() else {
        return Err(AppError::NotFound("Not found".to_string()));
    };

    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing admin key".to_string()))?;

    if !tokens::constant_time_eq(provided, expected) {
        return Err(AppError::Unauthorized("Invalid admin key".to_string()));
    }
    Ok(())
}

/// Run the plan expiry check now, exactly as the daily job would.
pub async fn run_reminders(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<RunReport>, AppError> {
    require_admin_key(&state, &headers)?;

    tracing::info!("Manually triggering plan expiry check");
    state.reminders.run_now().await.map(Json).ok_or_else(|| {
        AppError::Conflict("A plan expiry check is already running".to_string())
    })
}
