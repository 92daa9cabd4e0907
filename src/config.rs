//! Routing configuration
//!
//! All fields carry serde defaults so a partial TOML file (or none at all)
//! yields a working configuration.

use crate::error::{Result, RouteError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level settings for the routing engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// How long an agent has to answer an offer (default: 30000)
    #[serde(default = "default_offer_timeout_ms")]
    pub offer_timeout_ms: u64,

    /// Retention window of a conversation log, reset on every append (default: 24h)
    #[serde(default = "default_retention_secs")]
    pub conversation_ttl_secs: u64,

    /// Retention window of a room → egress mapping (default: 24h)
    #[serde(default = "default_retention_secs")]
    pub egress_ttl_secs: u64,

    /// Lifetime of issued room access tokens (default: 6h)
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Recording and transcription settings
    #[serde(default)]
    pub recording: RecordingConfig,

    /// NATS transport settings
    #[serde(default)]
    pub nats: NatsConfig,
}

/// Recording stop/download/transcription bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Status polls after a stop request before giving up (default: 15)
    #[serde(default = "default_stop_poll_attempts")]
    pub stop_poll_attempts: u32,

    /// Fixed delay between status polls (default: 2000)
    #[serde(default = "default_stop_poll_interval_ms")]
    pub stop_poll_interval_ms: u64,

    /// Artifact download attempts (default: 3)
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,

    /// Linear backoff unit between download attempts (default: 3000)
    #[serde(default = "default_download_backoff_ms")]
    pub download_backoff_ms: u64,

    /// Upper bound on a single transcription call (default: 120)
    #[serde(default = "default_transcription_timeout_secs")]
    pub transcription_timeout_secs: u64,
}

/// NATS connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URL (default: nats://127.0.0.1:4222)
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Prefix for every subject used by the transport (default: callroute)
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Client connection name reported to the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
}

fn default_offer_timeout_ms() -> u64 {
    30_000
}

fn default_retention_secs() -> u64 {
    60 * 60 * 24
}

fn default_token_ttl_secs() -> u64 {
    60 * 60 * 6
}

fn default_stop_poll_attempts() -> u32 {
    15
}

fn default_stop_poll_interval_ms() -> u64 {
    2_000
}

fn default_download_attempts() -> u32 {
    3
}

fn default_download_backoff_ms() -> u64 {
    3_000
}

fn default_transcription_timeout_secs() -> u64 {
    120
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_subject_prefix() -> String {
    "callroute".to_string()
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            offer_timeout_ms: default_offer_timeout_ms(),
            conversation_ttl_secs: default_retention_secs(),
            egress_ttl_secs: default_retention_secs(),
            token_ttl_secs: default_token_ttl_secs(),
            recording: RecordingConfig::default(),
            nats: NatsConfig::default(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            stop_poll_attempts: default_stop_poll_attempts(),
            stop_poll_interval_ms: default_stop_poll_interval_ms(),
            download_attempts: default_download_attempts(),
            download_backoff_ms: default_download_backoff_ms(),
            transcription_timeout_secs: default_transcription_timeout_secs(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
            connection_name: None,
        }
    }
}

impl RouteConfig {
    /// Load configuration from a TOML file.
    /// Returns default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RouteError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: RouteConfig = toml::from_str(&content).map_err(|e| {
            RouteError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RouteError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RouteError::Config(format!("Failed to encode config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            RouteError::Config(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Reject settings that would make the engine spin or never wait
    pub fn validate(&self) -> Result<()> {
        if self.offer_timeout_ms == 0 {
            return Err(RouteError::Config(
                "offer_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.recording.stop_poll_attempts == 0 {
            return Err(RouteError::Config(
                "recording.stop_poll_attempts must be greater than zero".to_string(),
            ));
        }
        if self.recording.download_attempts == 0 {
            return Err(RouteError::Config(
                "recording.download_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }

    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }

    pub fn egress_ttl(&self) -> Duration {
        Duration::from_secs(self.egress_ttl_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl RecordingConfig {
    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    /// Delay before the given (1-based) retry of a download
    pub fn download_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.download_backoff_ms.saturating_mul(attempt as u64))
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }
}
