//! API layer
//!
//! HTTP handlers for:
//! - Content generation and stock selection
//! - Usage and business profiles
//! - Drafts
//! - Metrics (Prometheus)

mod businesses;
mod drafts;
mod dto;
mod generation;
pub mod metrics;
mod usage;

pub use dto::*;
pub use metrics::metrics_router;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    routing::{get, post},
};

use crate::AppState;
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;

/// Create the v1 API router
///
/// Routes (all authenticated):
/// - POST /generate
/// - POST /images/stock-selection
/// - GET /usage
/// - POST /businesses
/// - GET /businesses/:id
/// - GET /drafts/:id
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::generate))
        .route(
            "/images/stock-selection",
            post(generation::select_stock_image),
        )
        .route("/usage", get(usage::get_usage))
        .route("/businesses", post(businesses::create_business))
        .route("/businesses/:id", get(businesses::get_business))
        .route("/drafts/:id", get(drafts::get_draft))
}

/// Unwrap a JSON body, turning malformed input into a 400
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Count one finished request under its route label
fn record_outcome<T>(method: &str, endpoint: &str, result: &Result<T, AppError>) {
    let status = match result {
        Ok(_) => "200".to_string(),
        Err(error) => error.status_code().as_u16().to_string(),
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status])
        .inc();
}
