//! Runtime configuration loaded from a JSON file.
//!
//! Every section has defaults, and a missing or unreadable file falls back to them, so the
//! engine always starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::outputs::devices::DeviceInfo;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A batch containing an event this far behind the tracked session maximum marks a
    /// new session (game time units, seconds for the HUD feed)
    #[serde(alias = "sessionResetThresholdSeconds")]
    pub session_reset_threshold_seconds: u64,
    /// Live batches larger than this, arriving before anything was admitted in the
    /// session, are treated as replayed backlog
    #[serde(alias = "bulkBacklogThreshold")]
    pub bulk_backlog_threshold: usize,
    #[serde(alias = "tickIntervalMs")]
    pub tick_interval_ms: u64,
    /// Same text at the same game time within this window is a duplicate
    pub dedup_window_seconds: u64,
    /// How far back windowed comparators may look
    pub sensor_history_ms: u64,
    /// Seed for curve jitter draws
    pub random_seed: u64,
    pub identity: Identity,
    pub game_api: GameApiConfig,
    pub devices: DevicesConfig,
    pub patterns_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_reset_threshold_seconds: 60,
            bulk_backlog_threshold: 5,
            tick_interval_ms: crate::kernel::time::DEFAULT_TICK_MS,
            dedup_window_seconds: 10,
            sensor_history_ms: 10_000,
            random_seed: 0x5EED,
            identity: Identity::default(),
            game_api: GameApiConfig::default(),
            devices: DevicesConfig::default(),
            patterns_path: None,
        }
    }
}

/// Who counts as "self" and who is a tracked enemy for event filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub player_names: Vec<String>,
    pub clan_tags: Vec<String>,
    pub enemy_names: Vec<String>,
    pub enemy_clans: Vec<String>,
}

impl Identity {
    /// Case-sensitive containment, since HUD lines embed names with clan decorations.
    pub fn is_self(&self, actor: &str) -> bool {
        contains_any(actor, &self.player_names) || contains_any(actor, &self.clan_tags)
    }

    pub fn is_tracked_enemy(&self, actor: &str) -> bool {
        contains_any(actor, &self.enemy_names) || contains_any(actor, &self.enemy_clans)
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| !n.is_empty() && haystack.contains(n.as_str()))
}

/// Game telemetry HTTP adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameApiConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for GameApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8111".to_string(),
            timeout_ms: 200,
            poll_interval_ms: 100,
        }
    }
}

impl GameApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Device transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// HTTP device bridge; commands are only logged when absent
    pub endpoint: Option<String>,
    /// Per-command timeout
    pub timeout_ms: u64,
    pub refresh_interval_ms: u64,
    /// Devices reported by the logging transport
    pub static_devices: Vec<DeviceInfo>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 500,
            refresh_interval_ms: 5_000,
            static_devices: Vec::new(),
        }
    }
}

impl DevicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(100))
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults when the file is
    /// missing or does not parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    tracing::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
