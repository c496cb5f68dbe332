use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::components::follow_button::FollowButton;
use crate::error::AppError;
use crate::models::follow::FollowStats;
use crate::models::post::Post;
use crate::models::user::{UpdateUser, User};
use crate::services::follows::FollowService;
use crate::services::posts::PostService;
use crate::services::users::UserService;

use super::auth::CurrentUser;
use super::posts::{bad_form, read_file_field};
use super::AppState;

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct FollowState {
    following: bool,
    label: &'static str,
}

impl From<&FollowButton> for FollowState {
    fn from(button: &FollowButton) -> Self {
        Self {
            following: button.following().unwrap_or(false),
            label: button.label(),
        }
    }
}

async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.users.get_users(params.limit).await?))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.get_user_by_id(id).await?))
}

/// Multipart fields: `name`, `bio` and an optional `file` for the avatar.
async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<User>, AppError> {
    let mut update = UpdateUser {
        name: current.user.name.clone(),
        bio: current.user.bio.clone(),
        file: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "name" => update.name = field.text().await.map_err(bad_form)?,
            "bio" => update.bio = field.text().await.map_err(bad_form)?,
            "file" => update.file = read_file_field(field).await?,
            _ => {}
        }
    }

    Ok(Json(state.users.update_user(current.user.id, update).await?))
}

async fn saved_posts(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.posts.get_saved_posts(current.user.id).await?))
}

async fn user_posts(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.posts.get_user_posts(id).await?))
}

async fn stats(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<FollowStats>, AppError> {
    Ok(Json(state.follows.stats(id).await?))
}

async fn followers(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.follows.followers_list(id).await?))
}

async fn following(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.follows.following_list(id).await?))
}

async fn follow_state(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowState>, AppError> {
    let mut button = FollowButton::new(current.user.id, id);
    button.refresh(&state.follows).await?;
    Ok(Json(FollowState::from(&button)))
}

async fn follow(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowState>, AppError> {
    state.follows.follow_user(current.user.id, id).await?;
    follow_state(State(state), current, Path(id)).await
}

async fn unfollow(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowState>, AppError> {
    state.follows.unfollow_user(current.user.id, id).await?;
    follow_state(State(state), current, Path(id)).await
}

/// Flips the relationship and reports what is stored.
async fn toggle_follow(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowState>, AppError> {
    let following = state.follows.toggle_follow(current.user.id, id).await?;
    Ok(Json(FollowState {
        following,
        label: if following { "Unfollow" } else { "Follow" },
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", put(update_me))
        .route("/me/saved", get(saved_posts))
        .route("/:id", get(get_user))
        .route("/:id/posts", get(user_posts))
        .route("/:id/stats", get(stats))
        .route("/:id/followers", get(followers))
        .route("/:id/following", get(following))
        .route("/:id/follow", get(follow_state).post(follow).delete(unfollow))
        .route("/:id/follow/toggle", post(toggle_follow))
}
