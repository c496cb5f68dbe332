//! Like and save state for one post as a viewer sees it, updated optimistically.
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::helpers::retry::{with_retry, RetryConfig};
use crate::models::notification::NewNotification;
use crate::models::post::Post;
use crate::services::notifications::NotificationService;
use crate::services::posts::PostService;
use crate::services::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOp {
    Added,
    Removed,
}

/// Local state captured before an optimistic change, restored verbatim on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeSnapshot {
    pub previous: Vec<Uuid>,
    pub op: LikeOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveSnapshot {
    pub previous: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostStats {
    pub post_id: Uuid,
    pub creator_id: Uuid,
    pub viewer_id: Uuid,
    likes: Vec<Uuid>,
    /// Id of the viewer's save record, if the post is saved.
    save_id: Option<Uuid>,
}

impl PostStats {
    pub fn new(post: &Post, viewer_id: Uuid, save_id: Option<Uuid>) -> Self {
        Self {
            post_id: post.id,
            creator_id: post.creator_id,
            viewer_id,
            likes: post.likes.clone(),
            save_id,
        }
    }

    pub fn likes(&self) -> &[Uuid] {
        &self.likes
    }

    pub fn is_liked(&self) -> bool {
        self.likes.contains(&self.viewer_id)
    }

    pub fn is_saved(&self) -> bool {
        self.save_id.is_some()
    }

    /// Flip the viewer's like locally.
    pub fn apply_like(&mut self) -> LikeSnapshot {
        let previous = self.likes.clone();
        let op = if self.is_liked() {
            self.likes.retain(|id| *id != self.viewer_id);
            LikeOp::Removed
        } else {
            self.likes.push(self.viewer_id);
            LikeOp::Added
        };
        LikeSnapshot { previous, op }
    }

    pub fn rollback_like(&mut self, snapshot: LikeSnapshot) {
        self.likes = snapshot.previous;
    }

    /// Toggle the like, write it, and notify the creator about new likes.
    ///
    /// Storage only ever sees this viewer's own change, so likes other users make
    /// in the meantime survive both the write and its undo. On failure the local
    /// state returns to the snapshot. Returns whether the post is now liked.
    #[tracing::instrument(skip_all, fields(post_id = %self.post_id, viewer = %self.viewer_id))]
    pub async fn toggle_like<P, N>(
        &mut self,
        posts: &P,
        notifications: &N,
        retry: &RetryConfig,
    ) -> ServiceResult<bool>
    where
        P: PostService,
        N: NotificationService,
    {
        let snapshot = self.apply_like();

        let written = match snapshot.op {
            LikeOp::Added => posts.add_like(self.post_id, self.viewer_id).await,
            LikeOp::Removed => posts.remove_like(self.post_id, self.viewer_id).await,
        };
        let stored = match written {
            Ok(post) => post,
            Err(e) => {
                warn!(error = %e, "like failed, rolling back");
                self.rollback_like(snapshot);
                return Err(e);
            }
        };

        if snapshot.op == LikeOp::Added && self.creator_id != self.viewer_id {
            let note = NewNotification::like(self.viewer_id, self.creator_id, self.post_id);
            let notified = with_retry(retry, || notifications.notify_user(note.clone())).await;
            if let Err(e) = notified {
                warn!(error = %e, "like notification failed, undoing like");
                if let Err(undo) = posts.remove_like(self.post_id, self.viewer_id).await {
                    error!(error = %undo, "could not undo like");
                }
                self.rollback_like(snapshot);
                return Err(e);
            }
        }

        self.likes = stored.likes;
        debug!(liked = self.is_liked(), count = self.likes.len(), "like stored");
        Ok(self.is_liked())
    }

    /// Toggle the viewer's bookmark. Returns whether the post is now saved.
    #[tracing::instrument(skip_all, fields(post_id = %self.post_id, viewer = %self.viewer_id))]
    pub async fn toggle_save<P: PostService>(&mut self, posts: &P) -> ServiceResult<bool> {
        let snapshot = SaveSnapshot {
            previous: self.save_id,
        };

        let result = match snapshot.previous {
            Some(save_id) => {
                self.save_id = None;
                posts.delete_saved_post(save_id).await.map(|_| None)
            }
            None => {
                // placeholder until the record id is known
                self.save_id = Some(Uuid::nil());
                posts
                    .save_post(self.viewer_id, self.post_id)
                    .await
                    .map(|s| Some(s.id))
            }
        };

        match result {
            Ok(save_id) => {
                self.save_id = save_id;
                Ok(self.is_saved())
            }
            Err(e) => {
                warn!(error = %e, "save toggle failed, rolling back");
                self.save_id = snapshot.previous;
                Err(e)
            }
        }
    }
}
