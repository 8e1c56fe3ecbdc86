//! Generation endpoints

use axum::{Json, extract::State, extract::rejection::JsonRejection};

use super::dto::{GenerateRequest, StockSelectionRequest, StockSelectionResponse};
use super::{json_body, record_outcome};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::GenerationResponse;

/// POST /api/v1/generate
///
/// Soft image failures still answer 200 and are listed under `errors`.
pub async fn generate(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/v1/generate"])
        .start_timer();

    let result = async {
        let request = json_body(payload)?
            .into_request(state.config.generation.max_product_photo_bytes)?;
        state.generation.generate(&session.account_id, request).await
    }
    .await;

    record_outcome("POST", "/api/v1/generate", &result);
    result.map(Json)
}

/// POST /api/v1/images/stock-selection
///
/// Records the stock photo the user picked. Stock photos never count
/// against the image quota.
pub async fn select_stock_image(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<StockSelectionRequest>, JsonRejection>,
) -> Result<Json<StockSelectionResponse>, AppError> {
    let result: Result<StockSelectionResponse, AppError> = async {
        let request = json_body(payload)?;
        let (record, errors) = state
            .generation
            .record_stock_selection(&session.account_id, request.into())
            .await?;
        Ok(StockSelectionResponse {
            image: record.into(),
            errors,
        })
    }
    .await;

    record_outcome("POST", "/api/v1/images/stock-selection", &result);
    result.map(Json)
}
