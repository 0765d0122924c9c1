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

//! BLE transport session.
//!
//! Scans for advertising devices, runs the connect handshake (MTU request,
//! service discovery, characteristic lookup, notification subscription) as one
//! linear operation, and streams a file as Header → Data… → Trailer frames.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ble_constants::{config as ble_config, NOTIFY_CHAR_UUID, SERVICE_UUID, WRITE_CHAR_UUID};
use super::platform::{Advertisement, RadioAdapter, RadioLink};
use super::protocol::{self, FramedMessage};
use crate::config::RadioConfig;
use crate::device::{DeviceFilter, DiscoveredDevice, RadioDevice, Transport};
use crate::transport::{
    LinkEvent, LinkEventSender, ProgressFn, ResultSlot, SourceHandle, TransferJob,
    TransportSession,
};

/// A link that completed the handshake.
struct EstablishedLink {
    link: Arc<dyn RadioLink>,
    device: RadioDevice,
    mtu: usize,
}

type LinkSlot = Arc<Mutex<Option<Arc<EstablishedLink>>>>;
type PendingLink = Arc<Mutex<Option<Arc<dyn RadioLink>>>>;
type ObserverSlot = Arc<Mutex<Option<LinkEventSender>>>;

/// Session driving the BLE transport.
pub struct RadioSession {
    adapter: Arc<dyn RadioAdapter>,
    config: RadioConfig,
    filter: DeviceFilter,
    link: LinkSlot,
    pending: PendingLink,
    handshake: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    scan_token: Mutex<Option<CancellationToken>>,
    job: Mutex<Option<Arc<TransferJob>>>,
    observer: ObserverSlot,
}

impl RadioSession {
    pub fn new(adapter: Arc<dyn RadioAdapter>, config: RadioConfig) -> Self {
        let filter = DeviceFilter::with_prefixes(config.name_prefixes.iter().cloned());
        Self {
            adapter,
            config,
            filter,
            link: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(None)),
            handshake: Mutex::new(None),
            monitor: Mutex::new(None),
            scan_token: Mutex::new(None),
            job: Mutex::new(None),
            observer: Arc::new(Mutex::new(None)),
        }
    }

    fn current_link(&self) -> Option<Arc<EstablishedLink>> {
        self.link.lock().clone()
    }

    /// Decide whether an advertisement is a new target device.
    fn accept(&self, adv: Advertisement, seen: &mut HashSet<String>) -> Option<RadioDevice> {
        let name = adv.name?;
        if !self.filter.matches(&name) {
            return None;
        }
        if !seen.insert(adv.address.to_uppercase()) {
            return None;
        }
        debug!("Found BLE device {} ({})", name, adv.address);
        Some(RadioDevice {
            name,
            address: adv.address,
        })
    }

    /// Open the link and walk the handshake, resolving `slot` with the outcome.
    async fn handshake(
        adapter: Arc<dyn RadioAdapter>,
        target: RadioDevice,
        requested_mtu: usize,
        pending: PendingLink,
        slot: Arc<ResultSlot<Option<Arc<EstablishedLink>>>>,
    ) {
        let link = match adapter.connect(&target.address).await {
            Ok(link) => link,
            Err(e) => {
                warn!("BLE connect to {} failed: {:#}", target.address, e);
                let _ = slot.resolve(None);
                return;
            }
        };
        *pending.lock() = Some(link.clone());

        let negotiated = tokio::select! {
            result = Self::negotiate(link.as_ref(), requested_mtu) => result,
            _ = link.wait_disconnected() => Err(anyhow!("Link lost during handshake")),
        };

        let mtu = match negotiated {
            Ok(mtu) => mtu,
            Err(e) => {
                warn!("BLE handshake with {} failed: {:#}", target.address, e);
                if let Err(e) = link.disconnect().await {
                    debug!("Disconnect after failed handshake: {}", e);
                }
                pending.lock().take();
                let _ = slot.resolve(None);
                return;
            }
        };

        let established = Arc::new(EstablishedLink {
            link: link.clone(),
            device: target,
            mtu,
        });

        // Nobody is waiting any more (timeout or cleanup): release the link.
        if slot.resolve(Some(established)).is_err() {
            pending.lock().take();
            let _ = link.disconnect().await;
        }
    }

    /// Sequential GATT setup. Returns the MTU in effect.
    async fn negotiate(link: &dyn RadioLink, requested_mtu: usize) -> Result<usize> {
        link.request_mtu(requested_mtu)
            .await
            .context("MTU request failed")?;

        let services = link
            .discover_services()
            .await
            .context("Service discovery failed")?;

        let service = services
            .iter()
            .find(|s| s.uuid == SERVICE_UUID)
            .ok_or_else(|| anyhow!("Upload service {} not found", SERVICE_UUID))?;

        for characteristic in [WRITE_CHAR_UUID, NOTIFY_CHAR_UUID] {
            if !service.characteristics.contains(&characteristic) {
                bail!("Characteristic {} not found", characteristic);
            }
        }

        let mtu = match link.negotiated_mtu(SERVICE_UUID, WRITE_CHAR_UUID).await {
            Ok(mtu) => mtu,
            Err(e) => {
                warn!("Cannot read negotiated MTU, assuming {}: {:#}", ble_config::DEFAULT_MTU, e);
                ble_config::DEFAULT_MTU
            }
        };
        debug!("MTU in effect: {} (requested {})", mtu, requested_mtu);

        link.enable_notifications(SERVICE_UUID, NOTIFY_CHAR_UUID)
            .await
            .context("Enabling notifications failed")?;

        Ok(mtu)
    }

    /// Abort an in-flight handshake and close the link it opened.
    async fn abort_handshake(&self) {
        let handshake = self.handshake.lock().take();
        if let Some(handle) = handshake {
            handle.abort();
        }

        let pending = self.pending.lock().take();
        if let Some(link) = pending {
            if let Err(e) = link.disconnect().await {
                debug!("Disconnect of pending link failed: {}", e);
            }
        }
    }

    /// Watch an established link and report when it drops.
    fn spawn_monitor(&self, established: Arc<EstablishedLink>) {
        let link_slot = self.link.clone();
        let observer = self.observer.clone();

        let handle = tokio::spawn(async move {
            established.link.wait_disconnected().await;

            let lost = {
                let mut current = link_slot.lock();
                match current.as_ref() {
                    Some(link) if Arc::ptr_eq(link, &established) => {
                        current.take();
                        true
                    }
                    _ => false,
                }
            };

            if lost {
                warn!("BLE link to {} lost", established.device.name);
                if let Some(tx) = observer.lock().as_ref() {
                    let _ = tx.send(LinkEvent::Lost(Transport::Radio));
                }
            }
        });

        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }
}

/// Write the frames for one file, waiting for each acknowledgment.
async fn stream_frames(
    established: Arc<EstablishedLink>,
    job: Arc<TransferJob>,
    chunk_size: usize,
    pacing: Duration,
    on_progress: ProgressFn,
) -> Result<()> {
    let link = established.link.as_ref();
    let total = job.total_bytes();
    let header = FramedMessage::header_for_len(total)?;

    let mut file = tokio::fs::File::open(job.source().path())
        .await
        .with_context(|| format!("Cannot open {}", job.source().path().display()))?;

    send_frame(link, &header).await?;

    let mut buf = vec![0u8; chunk_size];
    loop {
        ensure_live(link, &job)?;

        let remaining = total - job.bytes_sent();
        if remaining == 0 {
            break;
        }

        let len = remaining.min(chunk_size as u64) as usize;
        file.read_exact(&mut buf[..len])
            .await
            .context("Source file truncated")?;

        send_frame(link, &FramedMessage::Data(buf[..len].to_vec())).await?;
        on_progress(job.record_sent(len as u64));

        tokio::time::sleep(pacing).await;
    }

    ensure_live(link, &job)?;
    send_frame(link, &FramedMessage::Trailer).await
}

async fn send_frame(link: &dyn RadioLink, frame: &FramedMessage) -> Result<()> {
    debug!("Writing {}", frame);
    link.write(SERVICE_UUID, WRITE_CHAR_UUID, &frame.encode())
        .await
        .with_context(|| format!("Write of {} failed", frame))
}

fn ensure_live(link: &dyn RadioLink, job: &TransferJob) -> Result<()> {
    if job.is_cancelled() {
        bail!("Transfer cancelled");
    }
    if !link.is_connected() {
        bail!("Link lost");
    }
    Ok(())
}

#[async_trait]
impl TransportSession for RadioSession {
    fn transport(&self) -> Transport {
        Transport::Radio
    }

    async fn scan(&self, timeout: Duration) -> Vec<DiscoveredDevice> {
        let token = CancellationToken::new();
        if let Some(previous) = self.scan_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        // The window covers starting discovery as well as listening.
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let service = self.config.filter_by_service.then_some(SERVICE_UUID);
        let started = tokio::select! {
            result = self.adapter.start_scan(service) => result,
            _ = &mut deadline => Err(anyhow!("Discovery did not start within {:?}", timeout)),
            _ = token.cancelled() => Err(anyhow!("Scan cancelled before discovery started")),
        };
        let mut advertisements = match started {
            Ok(stream) => stream,
            Err(e) => {
                warn!("BLE scan failed to start: {:#}", e);
                self.scan_token.lock().take();
                return Vec::new();
            }
        };

        info!("Scanning for BLE devices for {:?}", timeout);
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("BLE scan window elapsed");
                    break;
                }
                _ = token.cancelled() => {
                    info!("BLE scan cancelled");
                    break;
                }
                adv = advertisements.next() => match adv {
                    Some(adv) => {
                        if let Some(device) = self.accept(adv, &mut seen) {
                            found.push(DiscoveredDevice::Radio(device));
                        }
                    }
                    None => break,
                },
            }
        }

        // Dropping the stream stops discovery.
        drop(advertisements);
        self.scan_token.lock().take();

        info!("BLE scan found {} devices", found.len());
        found
    }

    fn cancel_scan(&self) {
        if let Some(token) = self.scan_token.lock().as_ref() {
            token.cancel();
        }
    }

    async fn connect(&self, device: &DiscoveredDevice, timeout: Duration) -> bool {
        let DiscoveredDevice::Radio(target) = device else {
            warn!("BLE session cannot connect to {}", device.id());
            return false;
        };

        if let Some(current) = self.current_link() {
            if current.device.address == target.address && current.link.is_connected() {
                info!("Already connected to {}", target.name);
                return true;
            }
        }
        self.cleanup().await;

        info!("Connecting to {} ({})", target.name, target.address);
        let (slot, outcome) = ResultSlot::new();
        let handle = tokio::spawn(Self::handshake(
            self.adapter.clone(),
            target.clone(),
            self.config.requested_mtu,
            self.pending.clone(),
            slot,
        ));
        *self.handshake.lock() = Some(handle);

        let established = match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(Some(established))) => established,
            Ok(_) => {
                self.abort_handshake().await;
                return false;
            }
            Err(_) => {
                warn!("BLE connect to {} timed out after {:?}", target.address, timeout);
                self.abort_handshake().await;
                return false;
            }
        };

        self.handshake.lock().take();
        self.pending.lock().take();
        *self.link.lock() = Some(established.clone());
        self.spawn_monitor(established.clone());

        info!(
            "Connected to {} (MTU {})",
            established.device.name, established.mtu
        );
        true
    }

    async fn transfer_file(&self, source: &SourceHandle, on_progress: ProgressFn) -> bool {
        let Some(established) = self.current_link() else {
            warn!("BLE transfer requested without a connection");
            return false;
        };
        if !established.link.is_connected() {
            warn!("BLE transfer requested on a dropped link");
            return false;
        }

        let job = Arc::new(TransferJob::new(source.clone()));
        *self.job.lock() = Some(job.clone());

        let chunk_size = ble_config::chunk_size_for_mtu(established.mtu, self.config.chunk_size);
        info!(
            "Sending {} ({} bytes) as {} frames of up to {} bytes",
            source.name(),
            job.total_bytes(),
            protocol::data_frame_count(job.total_bytes(), chunk_size),
            chunk_size
        );

        let worker = tokio::spawn(stream_frames(
            established,
            job.clone(),
            chunk_size,
            self.config.pacing(),
            on_progress,
        ));
        let result = match worker.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("BLE transfer task failed: {}", e)),
        };
        self.job.lock().take();

        match result {
            Ok(()) => {
                info!("BLE transfer of {} complete", source.name());
                true
            }
            Err(e) => {
                warn!(
                    "BLE transfer of {} failed after {} of {} bytes: {:#}",
                    source.name(),
                    job.bytes_sent(),
                    job.total_bytes(),
                    e
                );
                false
            }
        }
    }

    fn cancel_transfer(&self) {
        if let Some(job) = self.job.lock().as_ref() {
            info!("Cancelling BLE transfer of {}", job.source().name());
            job.cancel();
        }
    }

    async fn cleanup(&self) {
        self.abort_handshake().await;

        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            handle.abort();
        }

        let established = self.link.lock().take();
        if let Some(established) = established {
            info!("Disconnecting from {}", established.device.name);
            if let Err(e) = established.link.disconnect().await {
                warn!("BLE disconnect failed: {:#}", e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.current_link()
            .is_some_and(|established| established.link.is_connected())
    }

    fn connected_device(&self) -> Option<DiscoveredDevice> {
        self.current_link()
            .map(|established| DiscoveredDevice::Radio(established.device.clone()))
    }

    fn set_link_observer(&self, tx: LinkEventSender) {
        *self.observer.lock() = Some(tx);
    }
}
