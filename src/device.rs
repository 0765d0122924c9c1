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

//! Devices discovered on either transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name fragments that identify a target device (matched case-insensitively).
const DEVICE_MARKERS: [&str; 2] = ["ESP32", "ESP"];

/// The two transports a device can be reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Wifi,
    Radio,
}

impl Transport {
    /// The transport that is not this one.
    pub fn other(self) -> Self {
        match self {
            Transport::Wifi => Transport::Radio,
            Transport::Radio => Transport::Wifi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Wifi => "Wi-Fi",
            Transport::Radio => "BLE",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An access point advertised by a target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiDevice {
    pub ssid: String,
    /// Signal strength as reported by the platform scan (0-100 for nmcli).
    pub signal_level: i32,
}

/// A BLE peripheral advertising the upload service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioDevice {
    pub name: String,
    pub address: String,
}

/// A device produced by a scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum DiscoveredDevice {
    Wifi(WifiDevice),
    Radio(RadioDevice),
}

impl DiscoveredDevice {
    pub fn transport(&self) -> Transport {
        match self {
            DiscoveredDevice::Wifi(_) => Transport::Wifi,
            DiscoveredDevice::Radio(_) => Transport::Radio,
        }
    }

    /// SSID for Wi-Fi, hardware address for BLE.
    pub fn native_id(&self) -> &str {
        match self {
            DiscoveredDevice::Wifi(d) => &d.ssid,
            DiscoveredDevice::Radio(d) => &d.address,
        }
    }

    /// Human readable name shown to the user.
    pub fn display_name(&self) -> &str {
        match self {
            DiscoveredDevice::Wifi(d) => &d.ssid,
            DiscoveredDevice::Radio(d) => &d.name,
        }
    }

    pub fn id(&self) -> DeviceId {
        DeviceId {
            transport: self.transport(),
            native: self.native_id().to_string(),
        }
    }
}

/// Identity of a device: transport plus its native identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub transport: Transport,
    pub native: String,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.native)
    }
}

/// Inclusion predicate applied to scan results on both transports.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    prefixes: Vec<String>,
}

impl DeviceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept names starting with any of `prefixes`.
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Check whether a scanned identifier belongs to a target device.
    pub fn matches(&self, identifier: &str) -> bool {
        let upper = identifier.to_uppercase();
        DEVICE_MARKERS.iter().any(|marker| upper.contains(marker))
            || self.prefixes.iter().any(|prefix| upper.starts_with(prefix))
    }
}
