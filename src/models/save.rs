use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baas::databases::Document;

/// Bookmark edge from a user to a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Save {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Save {
    pub fn new(user_id: Uuid, post_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            post_id,
            created_at: Utc::now(),
        }
    }

    pub fn key(user_id: Uuid, post_id: Uuid) -> String {
        format!("save:{user_id}:{post_id}")
    }
}

impl Document for Save {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn unique_key(&self) -> Option<String> {
        Some(Self::key(self.user_id, self.post_id))
    }
}
