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

//! Platform seam for joining the device's access point.

use anyhow::Result;
use async_trait::async_trait;

/// One access point seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub signal_level: i32,
}

/// A network the host has joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedNetwork {
    pub ssid: String,
    /// Interface carrying the link. Requests are bound to it when known.
    pub interface: Option<String>,
}

/// Host Wi-Fi radio.
#[async_trait]
pub trait WifiRadio: Send + Sync {
    /// Run a scan and return the visible access points.
    async fn scan(&self) -> Result<Vec<AccessPoint>>;

    /// Join `ssid`, resolving once the link is available.
    async fn join(&self, ssid: &str, passphrase: &str) -> Result<JoinedNetwork>;

    /// Whether the joined link is still up.
    async fn is_link_active(&self, network: &JoinedNetwork) -> Result<bool>;

    /// Drop the link.
    async fn leave(&self, network: &JoinedNetwork) -> Result<()>;
}
