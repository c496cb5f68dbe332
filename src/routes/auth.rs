use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::baas::account::Session;
use crate::error::AppError;
use crate::models::user::{NewUser, SignIn, User};
use crate::services::users::UserService;
use crate::services::ServiceError;

use super::AppState;

/// The signed-in user, resolved from an `Authorization: Bearer <session secret>` header.
pub struct CurrentUser {
    pub user: User,
    pub secret: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ServiceError::Unauthorized)?;

        let user = state.users.current_user(bearer.token()).await?;
        Ok(Self {
            user,
            secret: bearer.token().to_owned(),
        })
    }
}

async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.users.create_user_account(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignIn>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.users.sign_in(payload).await?))
}

async fn sign_out(State(state): State<AppState>, current: CurrentUser) -> Result<StatusCode, AppError> {
    state.users.sign_out(&current.secret).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/sign-out", post(sign_out))
        .route("/me", get(me))
}
