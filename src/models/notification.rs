use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baas::databases::Document;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: Uuid,
    pub sender_id: Uuid,
    pub kind: NotificationKind,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub sender_id: Uuid,
    pub kind: NotificationKind,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
}

impl NewNotification {
    pub fn follow(sender_id: Uuid, user_id: Uuid) -> Self {
        Self {
            user_id,
            sender_id,
            kind: NotificationKind::Follow,
            post_id: None,
            comment_id: None,
        }
    }

    pub fn like(sender_id: Uuid, user_id: Uuid, post_id: Uuid) -> Self {
        Self {
            user_id,
            sender_id,
            kind: NotificationKind::Like,
            post_id: Some(post_id),
            comment_id: None,
        }
    }

    pub fn comment(sender_id: Uuid, user_id: Uuid, post_id: Uuid, comment_id: Uuid) -> Self {
        Self {
            user_id,
            sender_id,
            kind: NotificationKind::Comment,
            post_id: Some(post_id),
            comment_id: Some(comment_id),
        }
    }

    /// Deterministic key; two requests with the same key describe the same notification.
    pub fn idempotency_key(&self) -> String {
        idempotency_key(self.sender_id, self.user_id, self.kind, self.post_id, self.comment_id)
    }

    pub fn into_notification(self) -> Notification {
        Notification {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            sender_id: self.sender_id,
            kind: self.kind,
            post_id: self.post_id,
            comment_id: self.comment_id,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

fn idempotency_key(
    sender: Uuid,
    recipient: Uuid,
    kind: NotificationKind,
    post: Option<Uuid>,
    comment: Option<Uuid>,
) -> String {
    let opt = |id: Option<Uuid>| id.map(|i| i.to_string()).unwrap_or_default();
    format!("{sender}:{recipient}:{}:{}:{}", kind.as_str(), opt(post), opt(comment))
}

impl Document for Notification {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn unique_key(&self) -> Option<String> {
        Some(idempotency_key(
            self.sender_id,
            self.user_id,
            self.kind,
            self.post_id,
            self.comment_id,
        ))
    }
}
