//! In-process backend: document collections, blob storage, accounts and realtime.
pub mod account;
pub mod databases;
pub mod realtime;
pub mod storage;

use crate::config::BaasCfg;
use crate::models::{
    comment::Comment, follow::Follow, notification::Notification, post::Post, save::Save,
    share::Share, user::User,
};

use self::account::Accounts;
use self::databases::Collection;
use self::realtime::Realtime;
use self::storage::Storage;

#[derive(Clone)]
pub struct Databases {
    pub users: Collection<User>,
    pub posts: Collection<Post>,
    pub saves: Collection<Save>,
    pub follows: Collection<Follow>,
    pub notifications: Collection<Notification>,
    pub comments: Collection<Comment>,
    pub shares: Collection<Share>,
}

#[derive(Clone)]
pub struct Baas {
    pub endpoint: String,
    pub project_id: String,
    pub databases: Databases,
    pub storage: Storage,
    pub accounts: Accounts,
    pub realtime: Realtime,
}

impl Baas {
    pub fn new(cfg: &BaasCfg, realtime: Realtime) -> Self {
        let db = cfg.database_id.as_str();
        let ids = &cfg.collections;
        let databases = Databases {
            users: Collection::new(db, &ids.users, realtime.clone()),
            posts: Collection::new(db, &ids.posts, realtime.clone()),
            saves: Collection::new(db, &ids.saves, realtime.clone()),
            follows: Collection::new(db, &ids.follows, realtime.clone()),
            notifications: Collection::new(db, &ids.notifications, realtime.clone()),
            comments: Collection::new(db, &ids.comments, realtime.clone()),
            shares: Collection::new(db, &ids.shares, realtime.clone()),
        };

        Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_owned(),
            project_id: cfg.project_id.clone(),
            databases,
            storage: Storage::new(&cfg.endpoint, &cfg.project_id, &cfg.storage_id),
            accounts: Accounts::new(),
            realtime,
        }
    }

    /// Generated avatar for users without an uploaded image.
    pub fn initials_avatar_url(&self, name: &str) -> String {
        format!(
            "{}/avatars/initials?name={}&project={}",
            self.endpoint,
            crate::models::user::initials(name),
            self.project_id
        )
    }
}

impl Default for Baas {
    fn default() -> Self {
        Self::new(&BaasCfg::default(), Realtime::default())
    }
}
