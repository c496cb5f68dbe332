use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::services::notifications::NotificationService;
use crate::services::ServiceError;

use super::auth::CurrentUser;
use super::AppState;

#[derive(Serialize)]
struct Count {
    count: usize,
}

async fn list(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.notifications.get_notifications(current.user.id).await?))
}

async fn unread_count(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Count>, AppError> {
    let count = state.notifications.unread_count(current.user.id).await?;
    Ok(Json(Count { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    // only the recipient's own notifications are visible
    let mine = state.notifications.get_notifications(current.user.id).await?;
    if !mine.iter().any(|n| n.id == id) {
        return Err(ServiceError::NotFound(format!("notification {id}")).into());
    }
    Ok(Json(state.notifications.mark_as_read(id).await?))
}

async fn mark_all_read(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Count>, AppError> {
    let count = state.notifications.mark_all_as_read(current.user.id).await?;
    Ok(Json(Count { count }))
}

async fn clear(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Count>, AppError> {
    let count = state.notifications.clear_all(current.user.id).await?;
    Ok(Json(Count { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).delete(clear))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/:id/read", post(mark_read))
}
