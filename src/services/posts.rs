use axum::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::baas::databases::{Collection, DbError, DocumentList, Query};
use crate::baas::storage::Storage;
use crate::baas::Baas;
use crate::models::post::{dedup_likes, parse_tags, NewPost, Post, UpdatePost};
use crate::models::save::Save;
use crate::models::user::User;

use super::{ServiceError, ServiceResult, Svc};

pub const RECENT_POSTS_LIMIT: usize = 20;
pub const FEED_PAGE_SIZE: usize = 9;

#[async_trait]
pub trait PostService: Svc {
    async fn create_post(&self, post: NewPost) -> ServiceResult<Post>;
    async fn update_post(&self, post: UpdatePost) -> ServiceResult<Post>;
    async fn delete_post(&self, post_id: Uuid) -> ServiceResult<()>;
    async fn get_post_by_id(&self, post_id: Uuid) -> ServiceResult<Post>;
    async fn get_recent_posts(&self) -> ServiceResult<Vec<Post>>;
    /// One feed page, starting after `cursor`.
    async fn get_infinite_posts(&self, cursor: Option<Uuid>) -> ServiceResult<DocumentList<Post>>;
    async fn search_posts(&self, term: &str) -> ServiceResult<Vec<Post>>;
    async fn get_user_posts(&self, user_id: Uuid) -> ServiceResult<Vec<Post>>;
    /// Replace the likes list. Duplicate ids are dropped.
    async fn like_post(&self, post_id: Uuid, likes: Vec<Uuid>) -> ServiceResult<Post>;
    /// Add one like to the list as stored now. Liking twice is a no-op.
    async fn add_like(&self, post_id: Uuid, user_id: Uuid) -> ServiceResult<Post>;
    /// Remove one like from the list as stored now, leaving everyone else's.
    async fn remove_like(&self, post_id: Uuid, user_id: Uuid) -> ServiceResult<Post>;
    /// Bookmark a post; saving twice returns the existing record.
    async fn save_post(&self, user_id: Uuid, post_id: Uuid) -> ServiceResult<Save>;
    async fn delete_saved_post(&self, save_id: Uuid) -> ServiceResult<()>;
    async fn find_save(&self, user_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Save>>;
    async fn get_saved_posts(&self, user_id: Uuid) -> ServiceResult<Vec<Post>>;
}

#[derive(Clone)]
pub struct PostServiceBaas {
    posts: Collection<Post>,
    saves: Collection<Save>,
    users: Collection<User>,
    storage: Storage,
}

impl Svc for PostServiceBaas {}

impl PostServiceBaas {
    pub fn new(baas: &Baas) -> Self {
        Self {
            posts: baas.databases.posts.clone(),
            saves: baas.databases.saves.clone(),
            users: baas.databases.users.clone(),
            storage: baas.storage.clone(),
        }
    }
}

#[async_trait]
impl PostService for PostServiceBaas {
    #[tracing::instrument(skip_all, fields(creator = %post.creator_id))]
    async fn create_post(&self, post: NewPost) -> ServiceResult<Post> {
        post.validate()?;
        self.users.get(post.creator_id).await?;

        let (image_id, image_url) = self.storage.upload_image(post.file).await?;
        let now = Utc::now();
        let doc = Post {
            id: Uuid::now_v7(),
            creator_id: post.creator_id,
            caption: post.caption,
            image_id: Some(image_id),
            image_url: Some(image_url),
            location: post.location,
            tags: post.tags.as_deref().map(parse_tags).unwrap_or_default(),
            likes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        match self.posts.create(doc).await {
            Ok(created) => {
                info!(post_id = %created.id, "post created");
                Ok(created)
            }
            Err(e) => {
                self.storage.discard(image_id).await;
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(post_id = %post.post_id))]
    async fn update_post(&self, post: UpdatePost) -> ServiceResult<Post> {
        post.validate()?;
        let existing = self.posts.get(post.post_id).await?;

        let new_image = match post.file {
            Some(file) => Some(self.storage.upload_image(file).await?),
            None => None,
        };

        let replacement = new_image.clone();
        let tags = post.tags.as_deref().map(parse_tags).unwrap_or_default();
        let updated = self
            .posts
            .update(post.post_id, move |p| {
                p.caption = post.caption;
                p.location = post.location;
                p.tags = tags;
                if let Some((id, url)) = replacement {
                    p.image_id = Some(id);
                    p.image_url = Some(url);
                }
                p.updated_at = Utc::now();
            })
            .await;

        match updated {
            Ok(p) => {
                if let (Some(_), Some(old)) = (&new_image, existing.image_id) {
                    self.storage.discard(old).await;
                }
                Ok(p)
            }
            Err(e) => {
                if let Some((id, _)) = new_image {
                    self.storage.discard(id).await;
                }
                Err(e.into())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_post(&self, post_id: Uuid) -> ServiceResult<()> {
        let post = self.posts.delete(post_id).await?;
        if let Some(image_id) = post.image_id {
            self.storage.discard(image_id).await;
        }

        let saves = self
            .saves
            .list(Query::new().filter(move |s: &Save| s.post_id == post_id))
            .await?;
        for save in saves.documents {
            if let Err(e) = self.saves.delete(save.id).await {
                warn!(error = %e, save = %save.id, "could not delete save of removed post");
            }
        }

        info!("post deleted");
        Ok(())
    }

    async fn get_post_by_id(&self, post_id: Uuid) -> ServiceResult<Post> {
        Ok(self.posts.get(post_id).await?)
    }

    async fn get_recent_posts(&self) -> ServiceResult<Vec<Post>> {
        Ok(self
            .posts
            .list(Query::new().limit(RECENT_POSTS_LIMIT))
            .await?
            .documents)
    }

    async fn get_infinite_posts(&self, cursor: Option<Uuid>) -> ServiceResult<DocumentList<Post>> {
        let mut query = Query::new().limit(FEED_PAGE_SIZE);
        if let Some(cursor) = cursor {
            query = query.cursor_after(cursor);
        }
        Ok(self.posts.list(query).await?)
    }

    async fn search_posts(&self, term: &str) -> ServiceResult<Vec<Post>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .posts
            .list(Query::new().filter(move |p: &Post| p.caption.to_lowercase().contains(&term)))
            .await?
            .documents)
    }

    async fn get_user_posts(&self, user_id: Uuid) -> ServiceResult<Vec<Post>> {
        Ok(self
            .posts
            .list(Query::new().filter(move |p: &Post| p.creator_id == user_id))
            .await?
            .documents)
    }

    #[tracing::instrument(skip(self))]
    async fn like_post(&self, post_id: Uuid, likes: Vec<Uuid>) -> ServiceResult<Post> {
        let likes = dedup_likes(likes);
        Ok(self.posts.update(post_id, move |p| p.likes = likes).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn add_like(&self, post_id: Uuid, user_id: Uuid) -> ServiceResult<Post> {
        Ok(self
            .posts
            .update(post_id, move |p| {
                if !p.likes.contains(&user_id) {
                    p.likes.push(user_id);
                }
            })
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_like(&self, post_id: Uuid, user_id: Uuid) -> ServiceResult<Post> {
        Ok(self
            .posts
            .update(post_id, move |p| p.likes.retain(|id| *id != user_id))
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn save_post(&self, user_id: Uuid, post_id: Uuid) -> ServiceResult<Save> {
        self.posts.get(post_id).await?;
        match self.saves.create(Save::new(user_id, post_id)).await {
            Ok(save) => Ok(save),
            Err(DbError::Conflict { .. }) => self
                .saves
                .find_by_key(&Save::key(user_id, post_id))
                .await
                .ok_or_else(|| ServiceError::NotFound(format!("save of post {post_id}"))),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_saved_post(&self, save_id: Uuid) -> ServiceResult<()> {
        self.saves.delete(save_id).await?;
        Ok(())
    }

    async fn find_save(&self, user_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Save>> {
        Ok(self.saves.find_by_key(&Save::key(user_id, post_id)).await)
    }

    async fn get_saved_posts(&self, user_id: Uuid) -> ServiceResult<Vec<Post>> {
        let saves = self
            .saves
            .list(Query::new().filter(move |s: &Save| s.user_id == user_id))
            .await?;

        let mut posts = Vec::with_capacity(saves.documents.len());
        for save in saves.documents {
            match self.posts.get(save.post_id).await {
                Ok(p) => posts.push(p),
                Err(e) => warn!(error = %e, "saved post no longer exists"),
            }
        }
        Ok(posts)
    }
}
