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

//! Shared test doubles for the platform seams and the session trait.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use imagepush::bluetooth::ble_constants::{NOTIFY_CHAR_UUID, SERVICE_UUID, WRITE_CHAR_UUID};
use imagepush::bluetooth::{
    Advertisement, AdvertisementStream, RadioAdapter, RadioLink, RemoteService,
};
use imagepush::transport::{LinkEvent, LinkEventSender, ProgressFn, SourceHandle};
use imagepush::wifi::{AccessPoint, JoinedNetwork, WifiRadio};
use imagepush::{DiscoveredDevice, RadioDevice, Transport, TransportSession, WifiDevice};

/// Write `len` bytes of a repeating pattern to a temp file.
pub fn pattern_file(len: usize) -> (tempfile::NamedTempFile, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();
    file.flush().unwrap();
    (file, data)
}

pub fn wifi_device(ssid: &str) -> DiscoveredDevice {
    DiscoveredDevice::Wifi(WifiDevice {
        ssid: ssid.to_string(),
        signal_level: 60,
    })
}

pub fn radio_device(name: &str, address: &str) -> DiscoveredDevice {
    DiscoveredDevice::Radio(RadioDevice {
        name: name.to_string(),
        address: address.to_string(),
    })
}

// --- Wi-Fi -------------------------------------------------------------------

/// Scriptable Wi-Fi radio.
pub struct MockWifiRadio {
    pub access_points: Vec<AccessPoint>,
    pub scan_delay: Duration,
    pub scan_fails: bool,
    pub join_delay: Duration,
    pub join_fails: bool,
    pub link_active: AtomicBool,
    pub joins: Mutex<Vec<String>>,
    pub leaves: Mutex<Vec<String>>,
}

impl MockWifiRadio {
    pub fn with_ssids(ssids: &[&str]) -> Self {
        Self {
            access_points: ssids
                .iter()
                .map(|ssid| AccessPoint {
                    ssid: ssid.to_string(),
                    signal_level: 50,
                })
                .collect(),
            scan_delay: Duration::ZERO,
            scan_fails: false,
            join_delay: Duration::ZERO,
            join_fails: false,
            link_active: AtomicBool::new(true),
            joins: Mutex::new(Vec::new()),
            leaves: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WifiRadio for MockWifiRadio {
    async fn scan(&self) -> Result<Vec<AccessPoint>> {
        tokio::time::sleep(self.scan_delay).await;
        if self.scan_fails {
            return Err(anyhow!("scan rejected"));
        }
        Ok(self.access_points.clone())
    }

    async fn join(&self, ssid: &str, _passphrase: &str) -> Result<JoinedNetwork> {
        tokio::time::sleep(self.join_delay).await;
        if self.join_fails {
            return Err(anyhow!("join rejected"));
        }
        self.joins.lock().push(ssid.to_string());
        self.link_active.store(true, Ordering::SeqCst);
        Ok(JoinedNetwork {
            ssid: ssid.to_string(),
            interface: None,
        })
    }

    async fn is_link_active(&self, _network: &JoinedNetwork) -> Result<bool> {
        Ok(self.link_active.load(Ordering::SeqCst))
    }

    async fn leave(&self, network: &JoinedNetwork) -> Result<()> {
        self.leaves.lock().push(network.ssid.clone());
        Ok(())
    }
}

// --- BLE ---------------------------------------------------------------------

/// GATT link that records every write.
pub struct MockRadioLink {
    /// MTU the peer grants, whatever was requested.
    pub mtu: usize,
    pub requested_mtu: Mutex<Option<usize>>,
    /// Service discovery never completes.
    pub hang_discovery: bool,
    pub services: Vec<RemoteService>,
    pub connected: AtomicBool,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub notifications_enabled: AtomicBool,
    pub disconnects: AtomicUsize,
    /// Called after each recorded write with the number of writes so far.
    pub on_write: Mutex<Option<Box<dyn Fn(usize) + Send + Sync>>>,
    dropped: Notify,
}

impl MockRadioLink {
    pub fn new() -> Self {
        Self::with_services(vec![RemoteService {
            uuid: SERVICE_UUID,
            characteristics: vec![WRITE_CHAR_UUID, NOTIFY_CHAR_UUID],
        }])
    }

    pub fn with_services(services: Vec<RemoteService>) -> Self {
        Self {
            mtu: 517,
            requested_mtu: Mutex::new(None),
            hang_discovery: false,
            services,
            connected: AtomicBool::new(true),
            writes: Mutex::new(Vec::new()),
            notifications_enabled: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            on_write: Mutex::new(None),
            dropped: Notify::new(),
        }
    }

    /// Simulate the peer going away.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.dropped.notify_waiters();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl RadioLink for MockRadioLink {
    async fn request_mtu(&self, mtu: usize) -> Result<()> {
        *self.requested_mtu.lock() = Some(mtu);
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<RemoteService>> {
        if self.hang_discovery {
            futures::future::pending::<()>().await;
        }
        Ok(self.services.clone())
    }

    async fn negotiated_mtu(&self, service: Uuid, characteristic: Uuid) -> Result<usize> {
        assert_eq!(service, SERVICE_UUID);
        assert_eq!(characteristic, WRITE_CHAR_UUID);
        Ok(self.mtu)
    }

    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        assert_eq!(service, SERVICE_UUID);
        assert_eq!(characteristic, NOTIFY_CHAR_UUID);
        self.notifications_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()> {
        assert_eq!(service, SERVICE_UUID);
        assert_eq!(characteristic, WRITE_CHAR_UUID);
        if !self.is_connected() {
            return Err(anyhow!("not connected"));
        }
        let count = {
            let mut writes = self.writes.lock();
            writes.push(data.to_vec());
            writes.len()
        };
        if let Some(hook) = self.on_write.lock().as_ref() {
            hook(count);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn wait_disconnected(&self) {
        loop {
            let dropped = self.dropped.notified();
            if !self.is_connected() {
                return;
            }
            dropped.await;
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.drop_link();
        Ok(())
    }
}

/// Adapter that replays a fixed set of advertisements and hands out one link.
pub struct MockRadioAdapter {
    pub advertisements: Vec<Advertisement>,
    pub link: Arc<MockRadioLink>,
    pub connect_fails: bool,
    /// How long starting discovery takes.
    pub scan_start_delay: Duration,
    pub scan_filters: Mutex<Vec<Option<Uuid>>>,
    pub connects: Mutex<Vec<String>>,
}

impl MockRadioAdapter {
    pub fn new(advertisements: Vec<Advertisement>, link: Arc<MockRadioLink>) -> Self {
        Self {
            advertisements,
            link,
            connect_fails: false,
            scan_start_delay: Duration::ZERO,
            scan_filters: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
        }
    }
}

pub fn advertisement(address: &str, name: Option<&str>) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        name: name.map(str::to_string),
    }
}

#[async_trait]
impl RadioAdapter for MockRadioAdapter {
    async fn start_scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream> {
        tokio::time::sleep(self.scan_start_delay).await;
        self.scan_filters.lock().push(service);
        let advertisements = self.advertisements.clone();
        let stream = async_stream::stream! {
            for adv in advertisements {
                tokio::time::sleep(Duration::from_millis(10)).await;
                yield adv;
            }
            // Discovery keeps running until the stream is dropped.
            futures::future::pending::<()>().await;
        };
        Ok(Box::pin(stream))
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn RadioLink>> {
        self.connects.lock().push(address.to_string());
        if self.connect_fails {
            return Err(anyhow!("connect rejected"));
        }
        self.link.connected.store(true, Ordering::SeqCst);
        Ok(self.link.clone())
    }
}

// --- Sessions ----------------------------------------------------------------

/// Transport session double for coordinator tests.
pub struct MockSession {
    transport: Transport,
    pub devices: Vec<DiscoveredDevice>,
    pub connect_ok: AtomicBool,
    pub transfer_ok: AtomicBool,
    /// Progress fractions reported by a transfer, one per step.
    pub steps: Vec<f64>,
    pub step_delay: Duration,
    pub scan_delay: Duration,
    pub connected: Mutex<Option<DiscoveredDevice>>,
    pub connects: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub scans: AtomicUsize,
    cancelled: AtomicBool,
    scan_cancelled: Notify,
    observer: Mutex<Option<LinkEventSender>>,
}

impl MockSession {
    pub fn new(transport: Transport, devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            transport,
            devices,
            connect_ok: AtomicBool::new(true),
            transfer_ok: AtomicBool::new(true),
            steps: vec![0.25, 0.5, 0.75, 1.0],
            step_delay: Duration::from_millis(10),
            scan_delay: Duration::from_millis(10),
            connected: Mutex::new(None),
            connects: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            scan_cancelled: Notify::new(),
            observer: Mutex::new(None),
        }
    }

    /// Simulate the link dropping on its own.
    pub fn lose_link(&self) {
        self.connected.lock().take();
        if let Some(tx) = self.observer.lock().as_ref() {
            tx.send(LinkEvent::Lost(self.transport)).unwrap();
        }
    }
}

#[async_trait]
impl TransportSession for MockSession {
    fn transport(&self) -> Transport {
        self.transport
    }

    async fn scan(&self, timeout: Duration) -> Vec<DiscoveredDevice> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.scan_delay.min(timeout)) => self.devices.clone(),
            _ = self.scan_cancelled.notified() => Vec::new(),
        }
    }

    fn cancel_scan(&self) {
        self.scan_cancelled.notify_waiters();
    }

    async fn connect(&self, device: &DiscoveredDevice, _timeout: Duration) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_ok.load(Ordering::SeqCst) {
            self.connected.lock().take();
            return false;
        }
        *self.connected.lock() = Some(device.clone());
        true
    }

    async fn transfer_file(&self, _source: &SourceHandle, on_progress: ProgressFn) -> bool {
        self.cancelled.store(false, Ordering::SeqCst);
        for step in &self.steps {
            if self.cancelled.load(Ordering::SeqCst) || !self.is_connected() {
                return false;
            }
            on_progress(*step);
            tokio::time::sleep(self.step_delay).await;
        }
        self.transfer_ok.load(Ordering::SeqCst)
    }

    fn cancel_transfer(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    async fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().take();
    }

    fn is_connected(&self) -> bool {
        self.connected.lock().is_some()
    }

    fn connected_device(&self) -> Option<DiscoveredDevice> {
        self.connected.lock().clone()
    }

    fn set_link_observer(&self, tx: LinkEventSender) {
        *self.observer.lock() = Some(tx);
    }
}
