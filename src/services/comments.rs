use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::baas::databases::{Collection, Order, Query};
use crate::helpers::retry::{with_retry, RetryConfig};
use crate::models::comment::{Comment, NewComment};
use crate::models::notification::NewNotification;
use crate::models::post::Post;

use super::notifications::NotificationService;
use super::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct CommentService<N> {
    comments: Collection<Comment>,
    posts: Collection<Post>,
    notifications: N,
    retry: RetryConfig,
}

impl<N: NotificationService> CommentService<N> {
    pub fn new(
        comments: Collection<Comment>,
        posts: Collection<Post>,
        notifications: N,
        retry: RetryConfig,
    ) -> Self {
        Self {
            comments,
            posts,
            notifications,
            retry,
        }
    }

    /// Add a comment and notify the post's creator. If the notification cannot be
    /// delivered the comment is removed again.
    #[tracing::instrument(skip_all, fields(post_id = %comment.post_id))]
    pub async fn create_comment(&self, comment: NewComment) -> ServiceResult<Comment> {
        comment.validate()?;
        let content = comment.content.trim().to_owned();
        if content.is_empty() {
            return Err(ServiceError::Validation("comment is empty".into()));
        }
        let post = self.posts.get(comment.post_id).await?;

        let now = Utc::now();
        let created = self
            .comments
            .create(Comment {
                id: Uuid::now_v7(),
                post_id: comment.post_id,
                user_id: comment.user_id,
                content,
                created_at: now,
                updated_at: now,
            })
            .await?;

        if post.creator_id != comment.user_id {
            let note =
                NewNotification::comment(comment.user_id, post.creator_id, post.id, created.id);
            let notified =
                with_retry(&self.retry, || self.notifications.notify_user(note.clone())).await;
            if let Err(e) = notified {
                warn!(error = %e, "comment notification failed, removing comment");
                if let Err(undo) = self.comments.delete(created.id).await {
                    error!(error = %undo, comment = %created.id, "could not remove comment");
                }
                return Err(e);
            }
        }

        info!(comment_id = %created.id, "comment created");
        Ok(created)
    }

    /// Only the author may edit.
    pub async fn update_comment(
        &self,
        comment_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> ServiceResult<Comment> {
        let content = content.trim().to_owned();
        if content.is_empty() || content.chars().count() > 2200 {
            return Err(ServiceError::Validation(
                "comment must be between 1 and 2200 characters".into(),
            ));
        }

        let existing = self.comments.get(comment_id).await?;
        if existing.user_id != author_id {
            return Err(ServiceError::Forbidden("only the author can edit a comment".into()));
        }

        Ok(self
            .comments
            .update(comment_id, move |c| {
                c.content = content;
                c.updated_at = Utc::now();
            })
            .await?)
    }

    /// Only the author may delete. The matching notification is retracted.
    pub async fn delete_comment(&self, comment_id: Uuid, author_id: Uuid) -> ServiceResult<()> {
        let existing = self.comments.get(comment_id).await?;
        if existing.user_id != author_id {
            return Err(ServiceError::Forbidden("only the author can delete a comment".into()));
        }
        self.comments.delete(comment_id).await?;

        if let Ok(post) = self.posts.get(existing.post_id).await {
            let note = NewNotification::comment(author_id, post.creator_id, post.id, comment_id);
            if let Err(e) = self.notifications.retract(&note).await {
                warn!(error = %e, "could not retract comment notification");
            }
        }
        Ok(())
    }

    /// Oldest first.
    pub async fn get_post_comments(&self, post_id: Uuid) -> ServiceResult<Vec<Comment>> {
        Ok(self
            .comments
            .list(
                Query::new()
                    .filter(move |c: &Comment| c.post_id == post_id)
                    .order(Order::OldestFirst),
            )
            .await?
            .documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baas::Baas;
    use crate::models::notification::NotificationKind;
    use crate::services::notifications::NotificationServiceBaas;

    async fn setup() -> (Baas, CommentService<NotificationServiceBaas>, Post, NotificationServiceBaas) {
        let baas = Baas::default();
        let notes = NotificationServiceBaas::new(baas.databases.notifications.clone());
        let svc = CommentService::new(
            baas.databases.comments.clone(),
            baas.databases.posts.clone(),
            notes.clone(),
            RetryConfig::none(),
        );
        let now = Utc::now();
        let post = baas
            .databases
            .posts
            .create(Post {
                id: Uuid::now_v7(),
                creator_id: Uuid::now_v7(),
                caption: "hello world".into(),
                image_id: None,
                image_url: None,
                location: None,
                tags: vec![],
                likes: vec![],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        (baas, svc, post, notes)
    }

    fn comment(post: &Post, user_id: Uuid, content: &str) -> NewComment {
        NewComment {
            post_id: post.id,
            user_id,
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn comment_notifies_creator_once_per_comment() {
        let (_, svc, post, notes) = setup().await;
        let reader = Uuid::now_v7();

        svc.create_comment(comment(&post, reader, "nice")).await.unwrap();
        svc.create_comment(comment(&post, reader, "really nice")).await.unwrap();
        svc.create_comment(comment(&post, post.creator_id, "thanks")).await.unwrap();

        let inbox = notes.get_notifications(post.creator_id).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|n| n.kind == NotificationKind::Comment));

        let thread = svc.get_post_comments(post.id).await.unwrap();
        let texts: Vec<_> = thread.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["nice", "really nice", "thanks"]);
    }

    #[tokio::test]
    async fn failed_notification_removes_comment() {
        let (baas, svc, post, _) = setup().await;
        baas.databases.notifications.fail_next_writes(1);

        assert!(svc.create_comment(comment(&post, Uuid::now_v7(), "hi")).await.is_err());
        assert!(svc.get_post_comments(post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_author_edits_and_deletes() {
        let (_, svc, post, notes) = setup().await;
        let author = Uuid::now_v7();
        let c = svc.create_comment(comment(&post, author, "first")).await.unwrap();

        assert!(matches!(
            svc.update_comment(c.id, Uuid::now_v7(), "hijack").await,
            Err(ServiceError::Forbidden(_))
        ));
        let edited = svc.update_comment(c.id, author, "  edited ").await.unwrap();
        assert_eq!(edited.content, "edited");

        assert!(svc.delete_comment(c.id, Uuid::now_v7()).await.is_err());
        svc.delete_comment(c.id, author).await.unwrap();
        assert!(svc.get_post_comments(post.id).await.unwrap().is_empty());
        assert!(notes.get_notifications(post.creator_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let (_, svc, post, _) = setup().await;
        assert!(matches!(
            svc.create_comment(comment(&post, Uuid::now_v7(), "   ")).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
