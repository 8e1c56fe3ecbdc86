//! Draft endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::dto::DraftResponse;
use super::record_outcome;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /api/v1/drafts/:id
///
/// Draft with its linked text and image records.
pub async fn get_draft(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<DraftResponse>, AppError> {
    let result: Result<DraftResponse, AppError> = async {
        let draft = state
            .db
            .get_draft(&session.account_id, &id)
            .await?
            .ok_or(AppError::NotFound)?;

        let text = match &draft.text_id {
            Some(text_id) => state.db.get_generated_text(text_id).await?,
            None => None,
        };
        let image = match &draft.image_id {
            Some(image_id) => state.db.get_generated_image(image_id).await?,
            None => None,
        };

        Ok(DraftResponse::new(draft, text, image))
    }
    .await;

    record_outcome("GET", "/api/v1/drafts/:id", &result);
    result.map(Json)
}
