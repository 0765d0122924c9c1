// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wi-Fi transport settings.
    pub wifi: WifiConfig,

    /// BLE transport settings.
    pub radio: RadioConfig,

    /// Status message settings.
    pub status: StatusConfig,

    /// Which transports are usable on this machine.
    pub capabilities: CapabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Address the device serves HTTP on once joined to its access point.
    pub device_address: String,

    /// Pre-shared key for the device access point.
    /// Placeholder value; every device ships with the same key.
    pub passphrase: String,

    pub scan_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    /// Delay after the link comes up before it is used.
    pub settle_delay_ms: u64,

    /// Minimum interval between progress callbacks.
    pub progress_interval_ms: u64,

    /// Size of one HTTP body fragment.
    pub upload_chunk_size: usize,

    /// Link liveness poll interval. 0 disables polling.
    pub liveness_interval_secs: u64,

    pub request_timeout_secs: u64,

    /// Where the file is staged before upload. Defaults to the OS temp dir.
    pub staging_dir: Option<PathBuf>,

    /// Extra access point name prefixes accepted by the scan filter.
    pub name_prefixes: Vec<String>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            device_address: "192.168.4.1".to_string(),
            passphrase: "12345678".to_string(),
            scan_timeout_secs: 12,
            connect_timeout_secs: 20,
            settle_delay_ms: 1500,
            progress_interval_ms: 100,
            upload_chunk_size: 8192,
            liveness_interval_secs: 5,
            request_timeout_secs: 60,
            staging_dir: None,
            name_prefixes: Vec::new(),
        }
    }
}

impl WifiConfig {
    /// Base URL of the device, without a trailing slash.
    pub fn base_url(&self) -> String {
        let address = self.device_address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Option<Duration> {
        (self.liveness_interval_secs > 0).then(|| Duration::from_secs(self.liveness_interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub scan_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    /// MTU requested after the link comes up.
    pub requested_mtu: usize,

    /// Preferred data frame size, capped by the negotiated MTU.
    pub chunk_size: usize,

    /// Pause after each acknowledged data frame.
    pub pacing_ms: u64,

    /// Restrict scans to devices advertising the upload service.
    pub filter_by_service: bool,

    /// Extra device name prefixes accepted by the scan filter.
    pub name_prefixes: Vec<String>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            connect_timeout_secs: 20,
            requested_mtu: ble_constants::config::REQUESTED_MTU,
            chunk_size: ble_constants::config::DEFAULT_CHUNK_SIZE,
            pacing_ms: 20,
            filter_by_service: true,
            name_prefixes: Vec::new(),
        }
    }
}

impl RadioConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// How long success messages stay visible.
    pub success_clear_ms: u64,

    /// How long failure messages stay visible.
    pub failure_clear_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            success_clear_ms: 2500,
            failure_clear_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub wifi: bool,
    pub radio: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            wifi: true,
            radio: true,
        }
    }
}

impl Config {
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imagepush")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml_str(&content)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
