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

//! Wi-Fi transport session.
//!
//! Joins the device's access point, probes it, and uploads the selected file
//! over HTTP on that network.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::platform::{JoinedNetwork, WifiRadio};
use super::upload;
use crate::config::WifiConfig;
use crate::device::{DeviceFilter, DiscoveredDevice, Transport, WifiDevice};
use crate::transport::{
    LinkEvent, LinkEventSender, ProgressFn, ResultSlot, SourceHandle, TransferJob,
    TransportSession,
};

/// A joined network that passed the settle delay.
struct ActiveNetwork {
    network: JoinedNetwork,
    device: WifiDevice,
    client: Client,
}

type NetworkSlot = Arc<Mutex<Option<Arc<ActiveNetwork>>>>;
type ObserverSlot = Arc<Mutex<Option<LinkEventSender>>>;

/// Session driving the Wi-Fi transport.
pub struct WifiSession {
    radio: Arc<dyn WifiRadio>,
    config: WifiConfig,
    filter: DeviceFilter,
    network: NetworkSlot,
    join_task: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    scan_token: Mutex<Option<CancellationToken>>,
    job: Mutex<Option<Arc<TransferJob>>>,
    observer: ObserverSlot,
}

impl WifiSession {
    pub fn new(radio: Arc<dyn WifiRadio>, config: WifiConfig) -> Self {
        let filter = DeviceFilter::with_prefixes(config.name_prefixes.iter().cloned());
        Self {
            radio,
            config,
            filter,
            network: Arc::new(Mutex::new(None)),
            join_task: Mutex::new(None),
            monitor: Mutex::new(None),
            scan_token: Mutex::new(None),
            job: Mutex::new(None),
            observer: Arc::new(Mutex::new(None)),
        }
    }

    fn current(&self) -> Option<Arc<ActiveNetwork>> {
        self.network.lock().clone()
    }

    /// Join in a spawned task so a timed-out join can still be undone.
    fn spawn_join(
        &self,
        ssid: String,
        slot: Arc<ResultSlot<Option<JoinedNetwork>>>,
    ) -> JoinHandle<()> {
        let radio = self.radio.clone();
        let passphrase = self.config.passphrase.clone();

        tokio::spawn(async move {
            let joined = match radio.join(&ssid, &passphrase).await {
                Ok(network) => network,
                Err(e) => {
                    warn!("Joining {} failed: {:#}", ssid, e);
                    let _ = slot.resolve(None);
                    return;
                }
            };

            // Nobody is waiting any more: undo the join.
            if let Err(Some(network)) = slot.resolve(Some(joined)) {
                debug!("Join of {} completed after the caller gave up", network.ssid);
                if let Err(e) = radio.leave(&network).await {
                    debug!("Leaving late join failed: {:#}", e);
                }
            }
        })
    }

    /// Poll the link and report when it drops.
    fn spawn_monitor(&self, active: Arc<ActiveNetwork>) {
        let Some(interval) = self.config.liveness_interval() else {
            return;
        };
        let radio = self.radio.clone();
        let network_slot = self.network.clone();
        let observer = self.observer.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match radio.is_link_active(&active.network).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        warn!("Wi-Fi liveness check failed: {:#}", e);
                        break;
                    }
                }
            }

            let lost = {
                let mut current = network_slot.lock();
                match current.as_ref() {
                    Some(network) if Arc::ptr_eq(network, &active) => {
                        current.take();
                        true
                    }
                    _ => false,
                }
            };

            if lost {
                warn!("Wi-Fi link to {} lost", active.network.ssid);
                if let Some(tx) = observer.lock().as_ref() {
                    let _ = tx.send(LinkEvent::Lost(Transport::Wifi));
                }
            }
        });

        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Copy the source into a transfer-local temporary file.
    ///
    /// The copy is removed when the returned handle is dropped.
    async fn stage(&self, source: &SourceHandle) -> Result<NamedTempFile> {
        let dir = self
            .config
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let staged = tempfile::Builder::new()
            .prefix("imagepush-")
            .tempfile_in(&dir)
            .with_context(|| format!("Cannot create staging file in {}", dir.display()))?;

        let copied = tokio::fs::copy(source.path(), staged.path())
            .await
            .with_context(|| format!("Cannot stage {}", source.path().display()))?;

        if copied != source.size() {
            bail!(
                "{} changed while staging ({} bytes, expected {})",
                source.name(),
                copied,
                source.size()
            );
        }

        debug!("Staged {} at {}", source.name(), staged.path().display());
        Ok(staged)
    }

    async fn run_transfer(
        &self,
        active: &ActiveNetwork,
        job: Arc<TransferJob>,
        on_progress: ProgressFn,
    ) -> Result<bool> {
        let base_url = self.config.base_url();
        upload::probe(&active.client, &base_url).await?;

        if job.is_cancelled() {
            return Ok(false);
        }

        let staged = self.stage(job.source()).await?;
        let client = active.client.clone();
        let chunk_size = self.config.upload_chunk_size;
        let interval = self.config.progress_interval();

        let worker = tokio::spawn(async move {
            let result = upload::upload(
                &client,
                &base_url,
                staged.path(),
                job,
                chunk_size,
                interval,
                on_progress,
            )
            .await;
            drop(staged);
            result
        });

        worker
            .await
            .map_err(|e| anyhow!("Upload task failed: {}", e))?
    }
}

#[async_trait]
impl TransportSession for WifiSession {
    fn transport(&self) -> Transport {
        Transport::Wifi
    }

    async fn scan(&self, timeout: Duration) -> Vec<DiscoveredDevice> {
        let token = CancellationToken::new();
        if let Some(previous) = self.scan_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        info!("Scanning for Wi-Fi devices for {:?}", timeout);
        let result = tokio::select! {
            result = tokio::time::timeout(timeout, self.radio.scan()) => result,
            _ = token.cancelled() => {
                info!("Wi-Fi scan cancelled");
                self.scan_token.lock().take();
                return Vec::new();
            }
        };
        self.scan_token.lock().take();

        let access_points = match result {
            Ok(Ok(aps)) => aps,
            Ok(Err(e)) => {
                warn!("Wi-Fi scan failed: {:#}", e);
                return Vec::new();
            }
            Err(_) => {
                warn!("Wi-Fi scan timed out after {:?}", timeout);
                return Vec::new();
            }
        };

        let found: Vec<DiscoveredDevice> = access_points
            .into_iter()
            .filter(|ap| self.filter.matches(&ap.ssid))
            .map(|ap| {
                DiscoveredDevice::Wifi(WifiDevice {
                    ssid: ap.ssid,
                    signal_level: ap.signal_level,
                })
            })
            .collect();

        info!("Wi-Fi scan found {} devices", found.len());
        found
    }

    fn cancel_scan(&self) {
        if let Some(token) = self.scan_token.lock().as_ref() {
            token.cancel();
        }
    }

    async fn connect(&self, device: &DiscoveredDevice, timeout: Duration) -> bool {
        let DiscoveredDevice::Wifi(target) = device else {
            warn!("Wi-Fi session cannot connect to {}", device.id());
            return false;
        };

        if let Some(current) = self.current() {
            if current.device.ssid == target.ssid {
                info!("Already joined {}", target.ssid);
                return true;
            }
        }
        self.cleanup().await;

        let (slot, outcome) = ResultSlot::new();
        let handle = self.spawn_join(target.ssid.clone(), slot);
        *self.join_task.lock() = Some(handle);

        let network = match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(Some(network))) => network,
            Ok(_) => {
                self.join_task.lock().take();
                return false;
            }
            Err(_) => {
                warn!("Joining {} timed out after {:?}", target.ssid, timeout);
                // The join task leaves the network itself if it still completes.
                self.join_task.lock().take();
                return false;
            }
        };
        self.join_task.lock().take();

        // First requests straight after association tend to fail.
        tokio::time::sleep(self.config.settle_delay()).await;

        let client = match upload::build_client(&network, self.config.request_timeout()) {
            Ok(client) => client,
            Err(e) => {
                warn!("{:#}", e);
                let _ = self.radio.leave(&network).await;
                return false;
            }
        };

        let active = Arc::new(ActiveNetwork {
            network,
            device: target.clone(),
            client,
        });
        *self.network.lock() = Some(active.clone());
        self.spawn_monitor(active);

        info!("Connected to {} over Wi-Fi", target.ssid);
        true
    }

    async fn transfer_file(&self, source: &SourceHandle, on_progress: ProgressFn) -> bool {
        let Some(active) = self.current() else {
            warn!("Wi-Fi transfer requested without a joined network");
            return false;
        };

        let job = Arc::new(TransferJob::new(source.clone()));
        *self.job.lock() = Some(job.clone());

        info!(
            "Uploading {} ({} bytes) to {}",
            source.name(),
            job.total_bytes(),
            active.network.ssid
        );
        let result = self.run_transfer(&active, job.clone(), on_progress).await;
        self.job.lock().take();

        match result {
            Ok(true) => {
                info!("Upload of {} complete", source.name());
                true
            }
            Ok(false) => {
                info!("Upload of {} did not succeed", source.name());
                false
            }
            Err(e) => {
                warn!(
                    "Upload of {} failed after {} of {} bytes: {:#}",
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
            info!("Cancelling upload of {}", job.source().name());
            job.cancel();
        }
    }

    async fn cleanup(&self) {
        let join = self.join_task.lock().take();
        if let Some(handle) = join {
            handle.abort();
        }

        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            handle.abort();
        }

        let active = self.network.lock().take();
        if let Some(active) = active {
            if let Err(e) = self.radio.leave(&active.network).await {
                warn!("{:#}", e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.network.lock().is_some()
    }

    fn connected_device(&self) -> Option<DiscoveredDevice> {
        self.current()
            .map(|active| DiscoveredDevice::Wifi(active.device.clone()))
    }

    fn set_link_observer(&self, tx: LinkEventSender) {
        *self.observer.lock() = Some(tx);
    }
}
