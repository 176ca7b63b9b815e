use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error;
use url::Url;

const MIN_RECONNECT_INTERVAL_MS: u64 = 1000;
const MIN_TRANSMISSION_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid WebSocket URL \"{0}\" (expected ws:// or wss://)")]
    InvalidUrl(String),
    #[error("reconnect interval must be at least 1000ms, got {0}ms")]
    ReconnectIntervalTooShort(u64),
    #[error("data transmission interval must be at least 50ms, got {0}ms")]
    TransmissionIntervalTooShort(u64),
}

/// Relay connection settings, persisted as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub url: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Minimum gap between two `pose_data` uploads.
    pub data_transmission_interval_ms: u64,
    pub enable_biometric_data: bool,
    pub enable_pose_data: bool,
    pub enable_rep_detection: bool,
    /// Let the offline simulator drive the rep counter with synthetic motion.
    pub local_rep_simulation_enabled: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "ws://localhost:8765".into(),
            reconnect_interval_ms: 5000,
            max_reconnect_attempts: 10,
            data_transmission_interval_ms: 100,
            enable_biometric_data: true,
            enable_pose_data: true,
            enable_rep_detection: true,
            local_rep_simulation_enabled: false,
        }
    }
}

impl RelayConfig {
    /// Every problem with the config; empty means valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !self.url.is_empty() && !is_websocket_url(&self.url) {
            errors.push(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.reconnect_interval_ms < MIN_RECONNECT_INTERVAL_MS {
            errors.push(ConfigError::ReconnectIntervalTooShort(
                self.reconnect_interval_ms,
            ));
        }
        if self.data_transmission_interval_ms < MIN_TRANSMISSION_INTERVAL_MS {
            errors.push(ConfigError::TransmissionIntervalTooShort(
                self.data_transmission_interval_ms,
            ));
        }

        errors
    }
}

pub fn is_websocket_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "ws" | "wss"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    relay: RelayConfig,
}

/// JSON-file backed key-value store for the relay settings.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when the file is missing or
    /// cannot be parsed.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Failed to parse settings at {}, using defaults: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relay(&self) -> RelayConfig {
        self.read().relay.clone()
    }

    /// Validates and persists `config`. Invalid configs are rejected and
    /// nothing is written.
    pub fn update_relay(&self, config: RelayConfig) -> Result<RelayConfig> {
        let errors = config.validate();
        if let Some(first) = errors.first() {
            let detail = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow::Error::new(first.clone()).context(detail));
        }

        let mut guard = self.write();
        guard.relay = config.clone();
        self.persist(&guard)?;
        log::info!("Relay configuration saved to {}", self.path.display());
        Ok(config)
    }

    pub fn reset_relay(&self) -> Result<RelayConfig> {
        let mut guard = self.write();
        guard.relay = RelayConfig::default();
        self.persist(&guard)?;
        Ok(guard.relay.clone())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
