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

//! BlueZ implementation of the BLE central seam.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::platform::{Advertisement, AdvertisementStream, RadioAdapter, RadioLink, RemoteService};

/// How long to wait for BlueZ to finish resolving services after connect.
const SERVICES_RESOLVE_POLLS: u32 = 50;
const SERVICES_RESOLVE_INTERVAL: Duration = Duration::from_millis(100);

/// Default BlueZ adapter in the central role.
pub struct BluezAdapter {
    adapter: Adapter,
}

impl BluezAdapter {
    /// Open a BlueZ session and power on the default adapter.
    pub async fn new() -> Result<Self> {
        info!("Initializing BLE central...");

        // Create BlueZ session
        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        // Get the default adapter
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        // Ensure adapter is powered on
        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self { adapter })
    }
}

#[async_trait]
impl RadioAdapter for BluezAdapter {
    async fn start_scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream> {
        let filter = DiscoveryFilter {
            uuids: service.into_iter().collect(),
            transport: DiscoveryTransport::Le,
            ..Default::default()
        };
        self.adapter
            .set_discovery_filter(filter)
            .await
            .context("Failed to set discovery filter")?;

        let events = self
            .adapter
            .discover_devices()
            .await
            .context("Failed to start discovery")?;
        info!("BLE discovery started");

        let adapter = self.adapter.clone();
        let stream = async_stream::stream! {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::DeviceAdded(addr) = event {
                    let name = match adapter.device(addr) {
                        Ok(device) => device.name().await.unwrap_or(None),
                        Err(e) => {
                            debug!("Cannot query {}: {}", addr, e);
                            None
                        }
                    };
                    yield Advertisement {
                        address: addr.to_string(),
                        name,
                    };
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn RadioLink>> {
        let addr: Address = address
            .parse()
            .map_err(|e| anyhow!("Invalid BLE address {}: {}", address, e))?;
        let device = self.adapter.device(addr)?;

        if !device.is_connected().await? {
            device
                .connect()
                .await
                .with_context(|| format!("Failed to connect to {}", address))?;
        }
        info!("BLE link established with {}", address);

        Ok(Arc::new(BluezLink::new(device)))
    }
}

/// A connected BlueZ device.
pub struct BluezLink {
    device: Device,
    connected: AtomicBool,
    characteristics: Mutex<HashMap<(Uuid, Uuid), Characteristic>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluezLink {
    fn new(device: Device) -> Self {
        Self {
            device,
            connected: AtomicBool::new(true),
            characteristics: Mutex::new(HashMap::new()),
            notify_task: Mutex::new(None),
        }
    }

    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        self.characteristics
            .lock()
            .get(&(service, characteristic))
            .cloned()
            .ok_or_else(|| anyhow!("Characteristic {} not discovered", characteristic))
    }

    async fn wait_services_resolved(&self) -> Result<()> {
        for _ in 0..SERVICES_RESOLVE_POLLS {
            if self.device.is_services_resolved().await? {
                return Ok(());
            }
            tokio::time::sleep(SERVICES_RESOLVE_INTERVAL).await;
        }
        Err(anyhow!("Timed out waiting for service resolution"))
    }
}

#[async_trait]
impl RadioLink for BluezLink {
    async fn request_mtu(&self, mtu: usize) -> Result<()> {
        // BlueZ runs the ATT MTU exchange itself when the link comes up. The
        // granted value is read back per characteristic after discovery.
        debug!("MTU exchange handled by BlueZ, asking for {}", mtu);
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<RemoteService>> {
        self.wait_services_resolved().await?;

        let mut services = Vec::new();
        let mut cache = HashMap::new();

        for service in self.device.services().await? {
            let service_uuid = service.uuid().await?;
            let mut characteristics = Vec::new();

            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                characteristics.push(uuid);
                cache.insert((service_uuid, uuid), characteristic);
            }

            services.push(RemoteService {
                uuid: service_uuid,
                characteristics,
            });
        }

        debug!("Discovered {} services", services.len());
        *self.characteristics.lock() = cache;
        Ok(services)
    }

    async fn negotiated_mtu(&self, service: Uuid, characteristic: Uuid) -> Result<usize> {
        let characteristic = self.characteristic(service, characteristic)?;
        Ok(characteristic.mtu().await?)
    }

    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        let characteristic = self.characteristic(service, characteristic)?;
        let notifications = characteristic
            .notify()
            .await
            .context("Failed to subscribe to notifications")?;

        let handle = tokio::spawn(async move {
            pin_mut!(notifications);
            while let Some(value) = notifications.next().await {
                debug!("Device notification: {}", String::from_utf8_lossy(&value));
            }
            debug!("Notification stream ended");
        });

        if let Some(previous) = self.notify_task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(service, characteristic)?;
        characteristic
            .write(data)
            .await
            .context("Characteristic write failed")?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn wait_disconnected(&self) {
        match self.device.events().await {
            Ok(events) => {
                pin_mut!(events);
                if !self.device.is_connected().await.unwrap_or(false) {
                    self.connected.store(false, Ordering::Release);
                    return;
                }
                while let Some(event) = events.next().await {
                    if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Device events unavailable ({}), polling connection state", e);
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if !self.device.is_connected().await.unwrap_or(false) {
                        break;
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    async fn disconnect(&self) -> Result<()> {
        let notify_task = self.notify_task.lock().take();
        if let Some(task) = notify_task {
            task.abort();
        }
        self.characteristics.lock().clear();
        self.connected.store(false, Ordering::Release);

        if self.device.is_connected().await.unwrap_or(false) {
            self.device.disconnect().await?;
            info!("BLE link to {} closed", self.device.address());
        }
        Ok(())
    }
}
