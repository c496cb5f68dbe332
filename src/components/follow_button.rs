use tracing::warn;
use uuid::Uuid;

use crate::services::follows::FollowService;
use crate::services::ServiceResult;

/// Follow/unfollow button state for one (viewer, profile) pair.
///
/// A click sends the intent shown on the button, not a blind toggle, so repeated
/// clicks on a stale "Follow" label stay idempotent. After every click the state
/// is refetched from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowButton {
    pub viewer_id: Uuid,
    pub profile_id: Uuid,
    following: Option<bool>,
}

impl FollowButton {
    pub fn new(viewer_id: Uuid, profile_id: Uuid) -> Self {
        Self {
            viewer_id,
            profile_id,
            following: None,
        }
    }

    /// `None` until the first refresh.
    pub fn following(&self) -> Option<bool> {
        self.following
    }

    pub fn label(&self) -> &'static str {
        match self.following {
            Some(true) => "Unfollow",
            _ => "Follow",
        }
    }

    /// Hidden on the viewer's own profile.
    pub fn is_visible(&self) -> bool {
        self.viewer_id != self.profile_id
    }

    pub async fn refresh<F: FollowService>(&mut self, follows: &F) -> ServiceResult<bool> {
        let state = follows.is_following(self.viewer_id, self.profile_id).await?;
        self.following = Some(state);
        Ok(state)
    }

    pub async fn click<F: FollowService>(&mut self, follows: &F) -> ServiceResult<bool> {
        let outcome = if self.following == Some(true) {
            follows.unfollow_user(self.viewer_id, self.profile_id).await.map(|_| ())
        } else {
            follows.follow_user(self.viewer_id, self.profile_id).await.map(|_| ())
        };

        if let Err(e) = &outcome {
            warn!(error = %e, "follow toggle failed");
        }
        // storage decides what the button shows, whatever happened
        let state = self.refresh(follows).await?;
        outcome.map(|_| state)
    }
}
