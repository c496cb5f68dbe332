use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::baas::databases::Document;
use crate::baas::storage::NewFile;

#[derive(Debug, Clone, Validate)]
pub struct NewPost {
    pub creator_id: Uuid,
    #[validate(length(min = 5, max = 2200))]
    pub caption: String,
    pub file: NewFile,
    #[validate(length(min = 2, max = 100))]
    pub location: Option<String>,
    /// Comma separated, e.g. `"art, travel"`.
    #[validate(length(min = 2, max = 100))]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct UpdatePost {
    pub post_id: Uuid,
    #[validate(length(min = 5, max = 2200))]
    pub caption: String,
    /// Replaces the current image when present.
    pub file: Option<NewFile>,
    #[validate(length(min = 2, max = 100))]
    pub location: Option<String>,
    #[validate(length(min = 2, max = 100))]
    pub tags: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub caption: String,
    pub image_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    /// User ids, unique.
    pub likes: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Post {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Split a comma separated tag string. Whitespace is removed and empty tags dropped.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.split_whitespace().collect::<String>())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Keep the first occurrence of every id.
pub fn dedup_likes(likes: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(likes.len());
    likes.into_iter().filter(|id| seen.insert(*id)).collect()
}
