//! Configuration management for Beetroot.
//!
//! This module handles loading, saving, and managing Beetroot configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/beetroot/config.toml` |
//! | macOS | `~/Library/Application Support/Beetroot/config.toml` |
//! | Windows | `%APPDATA%\Beetroot\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use beetroot_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Chunk size: {}", config.transfer.chunk_size);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Beetroot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Connection settings
    pub connection: ConnectionConfig,
    /// Signaling settings
    pub signaling: SignalingConfig,
    /// Notification settings
    pub notifications: NotificationConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name placed in the session descriptions this device produces
    pub device_name: String,
    /// Directory where received files are saved
    pub output_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_name: hostname::get().map_or_else(
                |_| "Beetroot Device".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            output_dir: None,
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size for transfers
    pub chunk_size: usize,
    /// Buffered bytes above which the sender backs off
    pub buffered_high_water: u64,
    /// Back-off delay while throttled
    #[serde(with = "humantime_serde")]
    pub throttle_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            buffered_high_water: crate::DEFAULT_BUFFERED_HIGH_WATER,
            throttle_backoff: Duration::from_millis(crate::DEFAULT_THROTTLE_BACKOFF_MS),
        }
    }
}

/// Connection configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Grace period after a disconnect before giving up
    #[serde(with = "humantime_serde")]
    pub disconnect_grace: Duration,
    /// Address the initiator listens on
    pub bind_address: String,
    /// Addresses advertised as candidates (None = detect)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise: Option<Vec<String>>,
    /// How long to wait for a peer's hello frame
    #[serde(with = "humantime_serde")]
    pub hello_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            disconnect_grace: Duration::from_secs(crate::DEFAULT_DISCONNECT_GRACE_SECS),
            bind_address: "0.0.0.0:0".to_string(),
            advertise: None,
            hello_timeout: Duration::from_secs(10),
        }
    }
}

/// Signaling configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Label of the data channel
    pub channel_label: String,
    /// Lines containing this marker are removed from emitted signals
    pub strip_marker: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            channel_label: crate::DEFAULT_CHANNEL_LABEL.to_string(),
            strip_marker: crate::DEFAULT_STRIP_MARKER.to_string(),
        }
    }
}

/// Notification configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Permission granted by the host environment
    pub permission: NotificationPermission,
}

/// Host-controlled permission for completion notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// Notifications may be shown
    Granted,
    /// Notifications are blocked
    Denied,
    /// Not decided yet; treated as denied
    #[default]
    Prompt,
}

impl NotificationPermission {
    /// Whether a notification may be shown.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make a session unusable.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "transfer.chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.signaling.channel_label.is_empty() {
            return Err(Error::InvalidConfig {
                key: "signaling.channel_label".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "beetroot", "Beetroot")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
