use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baas::databases::Document;

/// Directed edge: `follower_id` follows `following_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Follow {
    pub fn new(follower_id: Uuid, following_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            follower_id,
            following_id,
            created_at: Utc::now(),
        }
    }

    pub fn edge_key(follower_id: Uuid, following_id: Uuid) -> String {
        format!("follow:{follower_id}:{following_id}")
    }
}

impl Document for Follow {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn unique_key(&self) -> Option<String> {
        Some(Self::edge_key(self.follower_id, self.following_id))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowStats {
    pub followers: usize,
    pub following: usize,
}
