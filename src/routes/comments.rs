use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::comment::Comment;

use super::auth::CurrentUser;
use super::AppState;

#[derive(Deserialize)]
struct EditComment {
    content: String,
}

async fn update_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<EditComment>,
) -> Result<Json<Comment>, AppError> {
    let comment = state
        .comments
        .update_comment(id, current.user.id, &body.content)
        .await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.comments.delete_comment(id, current.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", put(update_comment).delete(delete_comment))
}
