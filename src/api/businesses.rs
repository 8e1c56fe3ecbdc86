//! Business profile endpoints

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use super::dto::{BusinessResponse, CreateBusinessRequest};
use super::{json_body, record_outcome};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// POST /api/v1/businesses
pub async fn create_business(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<CreateBusinessRequest>, JsonRejection>,
) -> Result<Json<BusinessResponse>, AppError> {
    let result: Result<BusinessResponse, AppError> = async {
        let business = json_body(payload)?.into_business(&session.account_id)?;
        state.db.insert_business(&business).await?;
        tracing::info!(
            account_id = %session.account_id,
            business_id = %business.id,
            industry = %business.industry,
            "Business created"
        );
        Ok(BusinessResponse::from(business))
    }
    .await;

    record_outcome("POST", "/api/v1/businesses", &result);
    result.map(Json)
}

/// GET /api/v1/businesses/:id
pub async fn get_business(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<BusinessResponse>, AppError> {
    let result = state
        .db
        .get_business(&session.account_id, &id)
        .await
        .and_then(|business| business.ok_or(AppError::NotFound));

    record_outcome("GET", "/api/v1/businesses/:id", &result);
    result.map(|business| Json(business.into()))
}
