//! Usage endpoint

use axum::{extract::State, response::Json};

use super::dto::UsageResponse;
use super::record_outcome;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /api/v1/usage
///
/// Plan, counters and remaining quota for the current month.
pub async fn get_usage(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<UsageResponse>, AppError> {
    let result = state.ledger.snapshot(&session.account_id).await;
    record_outcome("GET", "/api/v1/usage", &result);
    Ok(Json(result?.into()))
}
