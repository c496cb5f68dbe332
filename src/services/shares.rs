use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::baas::databases::{Collection, Query};
use crate::models::post::Post;
use crate::models::share::Share;

use super::ServiceResult;

#[derive(Clone)]
pub struct ShareService {
    shares: Collection<Share>,
    posts: Collection<Post>,
}

impl ShareService {
    pub fn new(shares: Collection<Share>, posts: Collection<Post>) -> Self {
        Self { shares, posts }
    }

    #[tracing::instrument(skip(self))]
    pub async fn share_post(&self, user_id: Uuid, post_id: Uuid) -> ServiceResult<Share> {
        self.posts.get(post_id).await?;
        let share = self
            .shares
            .create(Share {
                id: Uuid::now_v7(),
                user_id,
                post_id,
                created_at: Utc::now(),
            })
            .await?;
        info!(share_id = %share.id, "post shared");
        Ok(share)
    }

    pub async fn share_count(&self, post_id: Uuid) -> ServiceResult<usize> {
        Ok(self
            .shares
            .count(Query::new().filter(move |s: &Share| s.post_id == post_id))
            .await)
    }
}
