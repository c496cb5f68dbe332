use std::sync::{Arc, Mutex};
use std::time::Duration;

use snapfeed::background::resilient_subscription::{ReconnectPolicy, ResilientSubscription};
use snapfeed::baas::Baas;
use snapfeed::components::follow_button::FollowButton;
use snapfeed::helpers::retry::RetryConfig;
use snapfeed::models::notification::NotificationKind;
use snapfeed::models::user::{NewUser, User};
use snapfeed::services::follows::{FollowService, FollowServiceBaas};
use snapfeed::services::notifications::{NotificationService, NotificationServiceBaas};
use snapfeed::services::users::{UserService, UserServiceBaas};

struct World {
    baas: Baas,
    users: UserServiceBaas,
    follows: FollowServiceBaas<NotificationServiceBaas>,
    notifications: NotificationServiceBaas,
}

impl World {
    fn new() -> Self {
        let baas = Baas::default();
        let notifications = NotificationServiceBaas::new(baas.databases.notifications.clone());
        let follows = FollowServiceBaas::new(
            baas.databases.follows.clone(),
            baas.databases.users.clone(),
            notifications.clone(),
            RetryConfig::none(),
        );
        Self {
            users: UserServiceBaas::new(&baas),
            baas,
            follows,
            notifications,
        }
    }

    async fn sign_up(&self, username: &str) -> User {
        self.users
            .create_user_account(NewUser {
                name: format!("{username} tester"),
                username: username.into(),
                email: format!("{username}@example.com"),
                password: "correct horse".into(),
            })
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn follow_notifies_and_mark_all_clears_unread() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;
    let cat = world.sign_up("cat").await;

    assert!(world.follows.follow_user(ann.id, bob.id).await.unwrap());
    assert!(world.follows.follow_user(cat.id, bob.id).await.unwrap());

    let inbox = world.notifications.get_notifications(bob.id).await.unwrap();
    assert_eq!(inbox.len(), 2);
    assert!(inbox.iter().all(|n| n.kind == NotificationKind::Follow && !n.is_read));
    // newest first
    assert_eq!(inbox[0].sender_id, cat.id);
    assert_eq!(world.notifications.unread_count(bob.id).await.unwrap(), 2);

    assert_eq!(world.notifications.mark_all_as_read(bob.id).await.unwrap(), 2);
    assert_eq!(world.notifications.unread_count(bob.id).await.unwrap(), 0);
    assert_eq!(world.notifications.mark_all_as_read(bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn refollowing_does_not_duplicate_the_notification() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;

    world.follows.follow_user(ann.id, bob.id).await.unwrap();
    world.follows.unfollow_user(ann.id, bob.id).await.unwrap();
    world.follows.follow_user(ann.id, bob.id).await.unwrap();

    assert_eq!(world.notifications.get_notifications(bob.id).await.unwrap().len(), 1);
    assert_eq!(world.follows.stats(bob.id).await.unwrap().followers, 1);
}

#[tokio::test]
async fn concurrent_follows_create_one_edge() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;

    let (first, second) = tokio::join!(
        world.follows.follow_user(ann.id, bob.id),
        world.follows.follow_user(ann.id, bob.id),
    );
    let created = [first.unwrap(), second.unwrap()];
    assert_eq!(created.iter().filter(|c| **c).count(), 1);
    assert_eq!(world.follows.stats(bob.id).await.unwrap().followers, 1);
    assert_eq!(world.follows.followers_list(bob.id).await.unwrap(), vec![ann]);
}

#[tokio::test]
async fn concurrent_toggles_are_serialized() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;

    let follows = Arc::new(world.follows.clone());
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let follows = follows.clone();
            tokio::spawn(async move { follows.toggle_follow(ann.id, bob.id).await })
        })
        .collect();

    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await.unwrap().unwrap());
    }
    // each toggle observes the previous one
    assert_eq!(seen.iter().filter(|s| **s).count(), 2);
    assert!(!follows.is_following(ann.id, bob.id).await.unwrap());
    assert_eq!(world.follows.stats(bob.id).await.unwrap().followers, 0);
}

#[tokio::test]
async fn follow_button_shows_stored_state() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;

    let mut button = FollowButton::new(ann.id, bob.id);
    assert!(button.is_visible());
    button.refresh(&world.follows).await.unwrap();
    assert_eq!(button.label(), "Follow");

    assert!(button.click(&world.follows).await.unwrap());
    assert_eq!(button.label(), "Unfollow");

    // a second screen still showing "Follow" repeats the intent harmlessly
    let mut stale = FollowButton::new(ann.id, bob.id);
    assert!(stale.click(&world.follows).await.unwrap());
    assert_eq!(world.follows.stats(bob.id).await.unwrap().followers, 1);

    assert!(!button.click(&world.follows).await.unwrap());
    assert_eq!(button.following(), Some(false));

    assert!(!FollowButton::new(ann.id, ann.id).is_visible());
}

#[tokio::test]
async fn realtime_subscription_sees_new_notifications() {
    let world = World::new();
    let ann = world.sign_up("ann").await;
    let bob = world.sign_up("bob").await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let sub = ResilientSubscription::spawn(
        world.baas.realtime.clone(),
        world.baas.databases.notifications.channel(),
        ReconnectPolicy::default(),
        move |event| sink.lock().unwrap().push(event),
    );

    world.follows.follow_user(ann.id, bob.id).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while events.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let received = events.lock().unwrap().clone();
    assert_eq!(received[0].payload["user_id"], bob.id.to_string());
    sub.stop();
}
