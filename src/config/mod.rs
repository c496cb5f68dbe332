pub mod tracing;

use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top level settings, layered as defaults < `appsettings.json` < `APP_*` env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCfg {
    pub listen_addr: String,
    /// Allowed CORS origins. Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub baas: BaasCfg,
    pub realtime: RealtimeCfg,
    pub fanout: FanoutCfg,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".into(),
            allowed_origins: Vec::new(),
            baas: BaasCfg::default(),
            realtime: RealtimeCfg::default(),
            fanout: FanoutCfg::default(),
        }
    }
}

impl AppCfg {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppCfg::default()))
            .merge(Json::file("appsettings.json"))
            .merge(Env::prefixed("APP_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaasCfg {
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub storage_id: String,
    pub collections: CollectionIds,
}

impl Default for BaasCfg {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/v1".into(),
            project_id: "snapfeed".into(),
            database_id: "main".into(),
            storage_id: "media".into(),
            collections: CollectionIds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionIds {
    pub users: String,
    pub posts: String,
    pub saves: String,
    pub follows: String,
    pub notifications: String,
    pub comments: String,
    pub shares: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            users: "users".into(),
            posts: "posts".into(),
            saves: "saves".into(),
            follows: "follows".into(),
            notifications: "notifications".into(),
            comments: "comments".into(),
            shares: "shares".into(),
        }
    }
}

/// Reconnect behaviour of realtime subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeCfg {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Per-subscriber buffer; events beyond it are dropped for that subscriber.
    pub buffer: usize,
}

impl Default for RealtimeCfg {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter: false,
            buffer: 64,
        }
    }
}

/// Retry settings for secondary writes such as notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutCfg {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FanoutCfg {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl FanoutCfg {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reconnect_contract() {
        let cfg = AppCfg::default();
        assert_eq!(cfg.realtime.max_attempts, 5);
        assert_eq!(cfg.realtime.base_delay_ms, 1000);
        assert_eq!(cfg.realtime.max_delay_ms, 5000);
        assert_eq!(cfg.baas.collections.follows, "follows");
    }

    #[test]
    fn json_overrides_nested_keys() {
        let cfg: AppCfg = Figment::from(Serialized::defaults(AppCfg::default()))
            .merge(Json::string(
                r#"{ "baas": { "project_id": "p1", "collections": { "posts": "posts_v2" } },
                     "realtime": { "max_attempts": 9 } }"#,
            ))
            .extract()
            .unwrap();

        assert_eq!(cfg.baas.project_id, "p1");
        assert_eq!(cfg.baas.collections.posts, "posts_v2");
        assert_eq!(cfg.baas.collections.users, "users");
        assert_eq!(cfg.realtime.max_attempts, 9);
        assert_eq!(cfg.realtime.max_delay_ms, 5000);
    }
}
