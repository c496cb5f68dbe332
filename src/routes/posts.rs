use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::baas::databases::DocumentList;
use crate::baas::storage::NewFile;
use crate::components::post_stats::PostStats;
use crate::error::AppError;
use crate::models::comment::{Comment, NewComment};
use crate::models::post::{NewPost, Post, UpdatePost};
use crate::models::share::Share;
use crate::services::posts::PostService;
use crate::services::ServiceError;

use super::auth::CurrentUser;
use super::{ensure_owner, AppState};

pub(super) fn bad_form(e: MultipartError) -> ServiceError {
    ServiceError::Validation(e.body_text())
}

pub(super) async fn read_file_field(field: Field<'_>) -> Result<Option<NewFile>, ServiceError> {
    let name = field.file_name().unwrap_or("upload").to_owned();
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();
    let bytes = field.bytes().await.map_err(bad_form)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(NewFile {
        name,
        mime_type,
        bytes: bytes.to_vec(),
    }))
}

#[derive(Default)]
struct PostForm {
    caption: String,
    location: Option<String>,
    tags: Option<String>,
    file: Option<NewFile>,
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, ServiceError> {
    let non_empty = |s: String| Some(s).filter(|s| !s.trim().is_empty());
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "caption" => form.caption = field.text().await.map_err(bad_form)?,
            "location" => form.location = non_empty(field.text().await.map_err(bad_form)?),
            "tags" => form.tags = non_empty(field.text().await.map_err(bad_form)?),
            "file" => form.file = read_file_field(field).await?,
            _ => {}
        }
    }
    Ok(form)
}

#[derive(Deserialize)]
struct FeedParams {
    cursor: Option<Uuid>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

#[derive(Deserialize)]
struct CommentBody {
    content: String,
}

#[derive(Serialize)]
struct StatsView {
    likes: Vec<Uuid>,
    liked: bool,
    saved: bool,
}

impl From<&PostStats> for StatsView {
    fn from(stats: &PostStats) -> Self {
        Self {
            likes: stats.likes().to_vec(),
            liked: stats.is_liked(),
            saved: stats.is_saved(),
        }
    }
}

#[derive(Serialize)]
struct ShareCount {
    count: usize,
}

/// Multipart fields: `caption`, `file`, and optional `location` and `tags`.
async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let form = read_post_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| ServiceError::Validation("an image is required".into()))?;

    let post = state
        .posts
        .create_post(NewPost {
            creator_id: current.user.id,
            caption: form.caption,
            file,
            location: form.location,
            tags: form.tags,
        })
        .await?;
    info!(post_id = %post.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<Post>, AppError> {
    let existing = state.posts.get_post_by_id(id).await?;
    ensure_owner(existing.creator_id, &current.user, "post")?;

    let form = read_post_form(multipart).await?;
    let post = state
        .posts
        .update_post(UpdatePost {
            post_id: id,
            caption: form.caption,
            file: form.file,
            location: form.location,
            tags: form.tags,
        })
        .await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let existing = state.posts.get_post_by_id(id).await?;
    ensure_owner(existing.creator_id, &current.user, "post")?;
    state.posts.delete_post(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_post(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Post>, AppError> {
    Ok(Json(state.posts.get_post_by_id(id).await?))
}

async fn feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<DocumentList<Post>>, AppError> {
    Ok(Json(state.posts.get_infinite_posts(params.cursor).await?))
}

async fn recent(State(state): State<AppState>) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.posts.get_recent_posts().await?))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(state.posts.search_posts(&params.q).await?))
}

async fn post_stats(state: &AppState, viewer: Uuid, post_id: Uuid) -> Result<PostStats, ServiceError> {
    let post = state.posts.get_post_by_id(post_id).await?;
    let save = state.posts.find_save(viewer, post_id).await?;
    Ok(PostStats::new(&post, viewer, save.map(|s| s.id)))
}

async fn get_stats(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatsView>, AppError> {
    let stats = post_stats(&state, current.user.id, id).await?;
    Ok(Json(StatsView::from(&stats)))
}

async fn toggle_like(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatsView>, AppError> {
    let mut stats = post_stats(&state, current.user.id, id).await?;
    stats
        .toggle_like(&state.posts, &state.notifications, &state.retry)
        .await?;
    Ok(Json(StatsView::from(&stats)))
}

async fn toggle_save(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatsView>, AppError> {
    let mut stats = post_stats(&state, current.user.id, id).await?;
    stats.toggle_save(&state.posts).await?;
    Ok(Json(StatsView::from(&stats)))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, AppError> {
    Ok(Json(state.comments.get_post_comments(id).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state
        .comments
        .create_comment(NewComment {
            post_id: id,
            user_id: current.user.id,
            content: body.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn share(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Share>), AppError> {
    let share = state.shares.share_post(current.user.id, id).await?;
    Ok((StatusCode::CREATED, Json(share)))
}

async fn share_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShareCount>, AppError> {
    let count = state.shares.share_count(id).await?;
    Ok(Json(ShareCount { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(feed).post(create_post))
        .route("/recent", get(recent))
        .route("/search", get(search))
        .route("/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/:id/stats", get(get_stats))
        .route("/:id/like", post(toggle_like))
        .route("/:id/save", post(toggle_save))
        .route("/:id/comments", get(list_comments).post(add_comment))
        .route("/:id/shares", get(share_count).post(share))
}
