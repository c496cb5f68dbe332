use axum::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::baas::databases::{Collection, DbError, Query};
use crate::models::notification::{NewNotification, Notification};

use super::{ServiceError, ServiceResult, Svc};

#[async_trait]
pub trait NotificationService: Svc {
    /// Create a notification. Repeating a request with the same idempotency key
    /// returns the stored notification instead of a duplicate.
    async fn notify_user(&self, note: NewNotification) -> ServiceResult<Notification>;
    /// Newest first.
    async fn get_notifications(&self, user_id: Uuid) -> ServiceResult<Vec<Notification>>;
    async fn unread_count(&self, user_id: Uuid) -> ServiceResult<usize>;
    async fn mark_as_read(&self, id: Uuid) -> ServiceResult<Notification>;
    /// Returns how many notifications were unread before the call.
    async fn mark_all_as_read(&self, user_id: Uuid) -> ServiceResult<usize>;
    /// Returns how many notifications were removed.
    async fn clear_all(&self, user_id: Uuid) -> ServiceResult<usize>;
    /// Remove the notification matching `note`, if it exists.
    async fn retract(&self, note: &NewNotification) -> ServiceResult<bool>;
}

#[derive(Clone)]
pub struct NotificationServiceBaas {
    notifications: Collection<Notification>,
}

impl Svc for NotificationServiceBaas {}

impl NotificationServiceBaas {
    pub fn new(notifications: Collection<Notification>) -> Self {
        Self { notifications }
    }
}

/// Count outcomes of a fan-out of independent writes.
fn settle<T>(results: Vec<Result<T, DbError>>) -> ServiceResult<usize> {
    let total = results.len();
    let failed = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .inspect(|e| warn!(error = %e, "bulk notification write failed"))
        .count();

    if failed > 0 {
        return Err(ServiceError::PartialFailure {
            succeeded: total - failed,
            failed,
        });
    }
    Ok(total)
}

#[async_trait]
impl NotificationService for NotificationServiceBaas {
    #[tracing::instrument(skip(self), fields(kind = note.kind.as_str()))]
    async fn notify_user(&self, note: NewNotification) -> ServiceResult<Notification> {
        if note.user_id == note.sender_id {
            return Err(ServiceError::Validation(
                "users are not notified about their own actions".into(),
            ));
        }

        let key = note.idempotency_key();
        match self.notifications.create(note.into_notification()).await {
            Ok(n) => {
                debug!(id = %n.id, "notification created");
                Ok(n)
            }
            Err(DbError::Conflict { .. }) => {
                debug!(%key, "notification already exists");
                self.notifications
                    .find_by_key(&key)
                    .await
                    .ok_or_else(|| ServiceError::NotFound(format!("notification {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_notifications(&self, user_id: Uuid) -> ServiceResult<Vec<Notification>> {
        let list = self
            .notifications
            .list(Query::new().filter(move |n: &Notification| n.user_id == user_id))
            .await?;
        Ok(list.documents)
    }

    async fn unread_count(&self, user_id: Uuid) -> ServiceResult<usize> {
        Ok(self
            .notifications
            .count(Query::new().filter(move |n: &Notification| n.user_id == user_id && !n.is_read))
            .await)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_as_read(&self, id: Uuid) -> ServiceResult<Notification> {
        let current = self.notifications.get(id).await?;
        if current.is_read {
            return Ok(current);
        }
        Ok(self.notifications.update(id, |n| n.is_read = true).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_all_as_read(&self, user_id: Uuid) -> ServiceResult<usize> {
        let unread = self
            .notifications
            .list(Query::new().filter(move |n: &Notification| n.user_id == user_id && !n.is_read))
            .await?
            .documents;

        let results = join_all(
            unread
                .iter()
                .map(|n| self.notifications.update(n.id, |n| n.is_read = true)),
        )
        .await;

        let updated = settle(results)?;
        info!(updated, "marked notifications as read");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn clear_all(&self, user_id: Uuid) -> ServiceResult<usize> {
        let all = self
            .notifications
            .list(Query::new().filter(move |n: &Notification| n.user_id == user_id))
            .await?
            .documents;

        let results = join_all(all.iter().map(|n| self.notifications.delete(n.id))).await;

        let removed = settle(results)?;
        info!(removed, "cleared notifications");
        Ok(removed)
    }

    async fn retract(&self, note: &NewNotification) -> ServiceResult<bool> {
        match self.notifications.find_by_key(&note.idempotency_key()).await {
            Some(n) => {
                self.notifications.delete(n.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baas::realtime::Realtime;
    use crate::models::notification::NotificationKind;

    fn service() -> (NotificationServiceBaas, Collection<Notification>) {
        let col = Collection::new("main", "notifications", Realtime::default());
        (NotificationServiceBaas::new(col.clone()), col)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_resolve_to_one_notification() {
        let (svc, col) = service();
        let note = NewNotification::follow(Uuid::now_v7(), Uuid::now_v7());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let svc = svc.clone();
                let note = note.clone();
                tokio::spawn(async move { svc.notify_user(note).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(col.count(Query::new()).await, 1);
    }

    #[tokio::test]
    async fn notify_is_idempotent() {
        let (svc, col) = service();
        let (a, b, post) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        let first = svc.notify_user(NewNotification::like(a, b, post)).await.unwrap();
        let again = svc.notify_user(NewNotification::like(a, b, post)).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(col.count(Query::new()).await, 1);
        assert_eq!(first.kind, NotificationKind::Like);
        assert!(!first.is_read);
    }

    #[tokio::test]
    async fn self_notification_is_rejected() {
        let (svc, _) = service();
        let a = Uuid::now_v7();
        assert!(matches!(
            svc.notify_user(NewNotification::follow(a, a)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn mark_as_read_twice_is_a_noop() {
        let (svc, _) = service();
        let n = svc
            .notify_user(NewNotification::follow(Uuid::now_v7(), Uuid::now_v7()))
            .await
            .unwrap();

        assert!(svc.mark_as_read(n.id).await.unwrap().is_read);
        let again = svc.mark_as_read(n.id).await.unwrap();
        assert!(again.is_read);
    }

    #[tokio::test]
    async fn mark_all_counts_only_unread_of_that_user() {
        let (svc, _) = service();
        let me = Uuid::now_v7();
        let other = Uuid::now_v7();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(svc.notify_user(NewNotification::follow(Uuid::now_v7(), me)).await.unwrap().id);
        }
        svc.notify_user(NewNotification::follow(me, other)).await.unwrap();
        svc.mark_as_read(ids[0]).await.unwrap();

        assert_eq!(svc.unread_count(me).await.unwrap(), 2);
        assert_eq!(svc.mark_all_as_read(me).await.unwrap(), 2);
        assert_eq!(svc.unread_count(me).await.unwrap(), 0);
        assert_eq!(svc.unread_count(other).await.unwrap(), 1);
        assert_eq!(svc.mark_all_as_read(me).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_failure_is_reported() {
        let (svc, col) = service();
        let me = Uuid::now_v7();
        for _ in 0..3 {
            svc.notify_user(NewNotification::follow(Uuid::now_v7(), me)).await.unwrap();
        }

        col.fail_next_writes(1);
        let err = svc.mark_all_as_read(me).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PartialFailure {
                succeeded: 2,
                failed: 1
            }
        ));
        assert_eq!(svc.unread_count(me).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_all_removes_only_that_user() {
        let (svc, _) = service();
        let me = Uuid::now_v7();
        let other = Uuid::now_v7();
        svc.notify_user(NewNotification::follow(other, me)).await.unwrap();
        svc.notify_user(NewNotification::like(other, me, Uuid::now_v7())).await.unwrap();
        svc.notify_user(NewNotification::follow(me, other)).await.unwrap();

        assert_eq!(svc.clear_all(me).await.unwrap(), 2);
        assert!(svc.get_notifications(me).await.unwrap().is_empty());
        assert_eq!(svc.get_notifications(other).await.unwrap().len(), 1);
    }
}
