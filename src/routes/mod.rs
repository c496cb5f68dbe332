pub mod auth;
pub mod comments;
pub mod notifications;
pub mod posts;
pub mod realtime;
pub mod users;

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::baas::Baas;
use crate::config::{AppCfg, RealtimeCfg};
use crate::helpers::retry::RetryConfig;
use crate::models::user::User;
use crate::services::comments::CommentService;
use crate::services::follows::FollowServiceBaas;
use crate::services::notifications::NotificationServiceBaas;
use crate::services::posts::PostServiceBaas;
use crate::services::shares::ShareService;
use crate::services::users::UserServiceBaas;
use crate::services::ServiceError;

#[derive(Clone)]
pub struct AppState {
    pub baas: Baas,
    pub users: UserServiceBaas,
    pub posts: PostServiceBaas,
    pub notifications: NotificationServiceBaas,
    pub follows: FollowServiceBaas<NotificationServiceBaas>,
    pub comments: CommentService<NotificationServiceBaas>,
    pub shares: ShareService,
    pub retry: RetryConfig,
    pub realtime: RealtimeCfg,
}

impl AppState {
    pub fn new(baas: Baas, cfg: &AppCfg) -> Self {
        let db = &baas.databases;
        let retry = RetryConfig::from(&cfg.fanout);
        let notifications = NotificationServiceBaas::new(db.notifications.clone());

        Self {
            users: UserServiceBaas::new(&baas),
            posts: PostServiceBaas::new(&baas),
            follows: FollowServiceBaas::new(
                db.follows.clone(),
                db.users.clone(),
                notifications.clone(),
                retry.clone(),
            ),
            comments: CommentService::new(
                db.comments.clone(),
                db.posts.clone(),
                notifications.clone(),
                retry.clone(),
            ),
            shares: ShareService::new(db.shares.clone(), db.posts.clone()),
            notifications,
            retry,
            realtime: cfg.realtime.clone(),
            baas,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/posts", posts::router())
        .nest("/comments", comments::router())
        .nest("/notifications", notifications::router())
        .route("/realtime", get(realtime::ws))
        .with_state(state)
}

fn ensure_owner(owner_id: Uuid, user: &User, what: &str) -> Result<(), ServiceError> {
    if owner_id == user.id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("{what} belongs to another user")))
    }
}
