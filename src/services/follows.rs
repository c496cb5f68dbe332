use std::sync::Arc;

use axum::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::baas::databases::{Collection, DbError, Query};
use crate::helpers::retry::{with_retry, RetryConfig};
use crate::models::follow::{Follow, FollowStats};
use crate::models::notification::NewNotification;
use crate::models::user::User;

use super::notifications::NotificationService;
use super::{ServiceError, ServiceResult, Svc};

#[async_trait]
pub trait FollowService: Svc {
    /// Returns true if a new edge was created; following twice is a no-op.
    async fn follow_user(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool>;
    /// Returns true if any edge was removed.
    async fn unfollow_user(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool>;
    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool>;
    /// Flip the follow state and return the state now in storage.
    async fn toggle_follow(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool>;
    async fn stats(&self, user_id: Uuid) -> ServiceResult<FollowStats>;
    async fn followers_list(&self, user_id: Uuid) -> ServiceResult<Vec<User>>;
    async fn following_list(&self, user_id: Uuid) -> ServiceResult<Vec<User>>;
}

type PairLocks = DashMap<(Uuid, Uuid), Arc<Mutex<()>>>;

#[derive(Clone)]
pub struct FollowServiceBaas<N> {
    follows: Collection<Follow>,
    users: Collection<User>,
    notifications: N,
    retry: RetryConfig,
    pair_locks: Arc<PairLocks>,
}

impl<N: NotificationService> Svc for FollowServiceBaas<N> {}

impl<N: NotificationService> FollowServiceBaas<N> {
    pub fn new(
        follows: Collection<Follow>,
        users: Collection<User>,
        notifications: N,
        retry: RetryConfig,
    ) -> Self {
        Self {
            follows,
            users,
            notifications,
            retry,
            pair_locks: Arc::new(DashMap::new()),
        }
    }

    async fn edges(&self, query: Query<Follow>) -> ServiceResult<Vec<Follow>> {
        Ok(self.follows.list(query).await?.documents)
    }

    async fn users_by_id(&self, ids: impl Iterator<Item = Uuid>) -> Vec<User> {
        let mut users = Vec::new();
        for id in ids {
            match self.users.get(id).await {
                Ok(u) => users.push(u),
                Err(e) => warn!(error = %e, "follow edge points at a missing user"),
            }
        }
        users
    }
}

#[async_trait]
impl<N: NotificationService> FollowService for FollowServiceBaas<N> {
    #[tracing::instrument(skip(self))]
    async fn follow_user(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool> {
        if follower_id == following_id {
            return Err(ServiceError::Validation("users cannot follow themselves".into()));
        }
        self.users.get(following_id).await?;

        let edge = match self.follows.create(Follow::new(follower_id, following_id)).await {
            Ok(edge) => edge,
            Err(DbError::Conflict { .. }) => {
                debug!("already following");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        // The edge only stands if its notification does.
        let note = NewNotification::follow(follower_id, following_id);
        let notified = with_retry(&self.retry, || self.notifications.notify_user(note.clone())).await;
        if let Err(e) = notified {
            warn!(error = %e, "follow notification failed, removing edge");
            if let Err(undo) = self.follows.delete(edge.id).await {
                error!(error = %undo, edge = %edge.id, "could not remove follow edge");
            }
            return Err(e);
        }

        info!("followed");
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn unfollow_user(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool> {
        let edges = self
            .edges(Query::new().filter(move |f: &Follow| {
                f.follower_id == follower_id && f.following_id == following_id
            }))
            .await?;

        let mut removed = false;
        for edge in edges {
            match self.follows.delete(edge.id).await {
                Ok(_) => removed = true,
                Err(DbError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed {
            info!("unfollowed");
        }
        Ok(removed)
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool> {
        Ok(self
            .follows
            .find_by_key(&Follow::edge_key(follower_id, following_id))
            .await
            .is_some())
    }

    #[tracing::instrument(skip(self))]
    async fn toggle_follow(&self, follower_id: Uuid, following_id: Uuid) -> ServiceResult<bool> {
        let pair = (follower_id, following_id);
        let lock = self.pair_locks.entry(pair).or_default().clone();

        let result = {
            let _guard = lock.lock().await;
            let flipped = if self.is_following(follower_id, following_id).await? {
                self.unfollow_user(follower_id, following_id).await
            } else {
                self.follow_user(follower_id, following_id).await
            };
            match flipped {
                Ok(_) => self.is_following(follower_id, following_id).await,
                Err(e) => Err(e),
            }
        };

        drop(lock);
        self.pair_locks.remove_if(&pair, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn stats(&self, user_id: Uuid) -> ServiceResult<FollowStats> {
        let followers = self
            .follows
            .count(Query::new().filter(move |f: &Follow| f.following_id == user_id))
            .await;
        let following = self
            .follows
            .count(Query::new().filter(move |f: &Follow| f.follower_id == user_id))
            .await;
        Ok(FollowStats {
            followers,
            following,
        })
    }

    async fn followers_list(&self, user_id: Uuid) -> ServiceResult<Vec<User>> {
        let edges = self
            .edges(Query::new().filter(move |f: &Follow| f.following_id == user_id))
            .await?;
        Ok(self.users_by_id(edges.into_iter().map(|f| f.follower_id)).await)
    }

    async fn following_list(&self, user_id: Uuid) -> ServiceResult<Vec<User>> {
        let edges = self
            .edges(Query::new().filter(move |f: &Follow| f.follower_id == user_id))
            .await?;
        Ok(self.users_by_id(edges.into_iter().map(|f| f.following_id)).await)
    }
}
