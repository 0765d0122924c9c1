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

//! Platform seam for the BLE central role.
//!
//! The session only talks to these traits; `connection` implements them on
//! top of BlueZ.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
}

/// A remote GATT service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Stream of advertisements. Dropping it stops the scan.
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// Local BLE adapter.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Start scanning, restricted to `service` when the platform supports it.
    async fn start_scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream>;

    /// Open a link-layer connection to the device at `address`.
    async fn connect(&self, address: &str) -> Result<Arc<dyn RadioLink>>;
}

/// An open link-layer connection.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Ask for a larger ATT MTU. The peer may grant less.
    async fn request_mtu(&self, mtu: usize) -> Result<()>;

    /// Discover remote services and cache their characteristics.
    async fn discover_services(&self) -> Result<Vec<RemoteService>>;

    /// ATT MTU actually in effect for a discovered characteristic.
    async fn negotiated_mtu(&self, service: Uuid, characteristic: Uuid) -> Result<usize>;

    /// Subscribe to notifications on a characteristic.
    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Write a value and wait for the peer's acknowledgment.
    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Resolves once the link has dropped.
    async fn wait_disconnected(&self);

    /// Close the link and drop cached characteristics.
    async fn disconnect(&self) -> Result<()>;
}

/// Adapter used when the binary is built without BLE support.
pub struct UnsupportedAdapter;

#[async_trait]
impl RadioAdapter for UnsupportedAdapter {
    async fn start_scan(&self, _service: Option<Uuid>) -> Result<AdvertisementStream> {
        Err(anyhow!("BLE support not compiled in"))
    }

    async fn connect(&self, _address: &str) -> Result<Arc<dyn RadioLink>> {
        Err(anyhow!("BLE support not compiled in"))
    }
}
