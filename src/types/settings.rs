use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Top-level sync settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncSettings {
    pub general: GeneralSettings,
    pub remote: RemoteSettings,
    #[serde(default)]
    pub stores: Vec<StoreSettings>,
}

impl SyncSettings {
    /// Resolves the timing values the coordinator runs with.
    pub fn timing(&self) -> SyncTiming {
        SyncTiming {
            auto_sync: self.general.auto_sync,
            sync_interval: Duration::from_secs(self.general.sync_interval_secs.max(1)),
            retry_interval: Duration::from_secs(self.general.retry_interval_secs.max(1)),
            initial_backoff: Duration::from_secs(self.general.initial_backoff_secs.max(1)),
            settle_delay: Duration::from_secs(self.general.settle_delay_secs),
        }
    }

    /// The prefix marking items the diff ignores; an empty string disables it.
    pub fn hidden_prefix(&self) -> Option<char> {
        self.general.hidden_prefix.chars().next()
    }
}

/// General sync behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralSettings {
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub retry_interval_secs: u64,
    pub initial_backoff_secs: u64,
    /// Quiet period after a local change before the next exchange.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    pub hidden_prefix: String,
    pub log_level: String,
}

fn default_settle_delay() -> u64 {
    2
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_secs: 15 * 60,
            retry_interval_secs: 30 * 60,
            initial_backoff_secs: 30,
            settle_delay_secs: default_settle_delay(),
            hidden_prefix: ".".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// The remote authoritative copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSettings {
    pub server_url: String,
    pub username: String,
    pub request_timeout_secs: u64,
    /// Stable identity of this installation, sent with every exchange.
    /// Assigned on first use by the settings engine.
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            server_url: "https://sync.example.org/bookmarks".to_string(),
            username: String::new(),
            request_timeout_secs: 60,
            client_id: None,
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// One local bookmark store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    pub name: String,
    pub path: PathBuf,
}

/// Timing values resolved from [`GeneralSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTiming {
    pub auto_sync: bool,
    pub sync_interval: Duration,
    pub retry_interval: Duration,
    pub initial_backoff: Duration,
    pub settle_delay: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        SyncSettings::default().timing()
    }
}

impl SyncTiming {
    /// Delay before retry number `attempt` (0-based): doubles each time,
    /// capped at the retry interval.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.retry_interval)
    }
}
