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

//! Device session coordinator.
//!
//! Owns the session state machine, keeps at most one transport connected,
//! gates scan and connect on host capabilities, and publishes snapshots to
//! observers through a watch channel.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::CapabilityGate;
use crate::config::{Config, StatusConfig};
use crate::device::{DiscoveredDevice, Transport};
use crate::events::{EventProcessor, StatusEvent};
use crate::state::{ActiveTransport, SelectedFile, SessionSnapshot, SessionState};
use crate::transport::{ProgressFn, SourceHandle, TransportSession};

/// Scan and connect bounds per transport.
#[derive(Debug, Clone, Copy)]
struct Timeouts {
    scan: Duration,
    connect: Duration,
}

pub struct DeviceCoordinator {
    wifi: Arc<dyn TransportSession>,
    radio: Arc<dyn TransportSession>,
    gate: Arc<dyn CapabilityGate>,
    wifi_timeouts: Timeouts,
    radio_timeouts: Timeouts,
    status: StatusConfig,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    status_generation: Arc<AtomicU64>,
    source: Mutex<Option<SourceHandle>>,
    link_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceCoordinator {
    /// Create the coordinator and start processing link events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        wifi: Arc<dyn TransportSession>,
        radio: Arc<dyn TransportSession>,
        gate: Arc<dyn CapabilityGate>,
        config: &Config,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        wifi.set_link_observer(tx.clone());
        radio.set_link_observer(tx);

        let (snapshot, _) = watch::channel(SessionSnapshot::default());

        let coordinator = Arc::new(Self {
            wifi,
            radio,
            gate,
            wifi_timeouts: Timeouts {
                scan: config.wifi.scan_timeout(),
                connect: config.wifi.connect_timeout(),
            },
            radio_timeouts: Timeouts {
                scan: config.radio.scan_timeout(),
                connect: config.radio.connect_timeout(),
            },
            status: config.status.clone(),
            snapshot: Arc::new(snapshot),
            status_generation: Arc::new(AtomicU64::new(0)),
            source: Mutex::new(None),
            link_task: Mutex::new(None),
        });

        let processor = EventProcessor::new(Arc::downgrade(&coordinator));
        let handle = tokio::spawn(processor.run(rx));
        *coordinator.link_task.lock() = Some(handle);

        coordinator
    }

    fn session(&self, transport: Transport) -> &Arc<dyn TransportSession> {
        match transport {
            Transport::Wifi => &self.wifi,
            Transport::Radio => &self.radio,
        }
    }

    fn timeouts(&self, transport: Transport) -> Timeouts {
        match transport {
            Transport::Wifi => self.wifi_timeouts,
            Transport::Radio => self.radio_timeouts,
        }
    }

    /// Observe snapshots. The receiver starts at the current one.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// Move to `to` and apply `update` if the current state satisfies `from`.
    ///
    /// Returns false, leaving the snapshot untouched, otherwise.
    fn begin(
        &self,
        from: fn(&SessionState) -> bool,
        to: SessionState,
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> bool {
        let mut started = false;
        self.snapshot.send_if_modified(|s| {
            if !from(&s.state) {
                return false;
            }
            s.state = to;
            update(s);
            started = true;
            true
        });
        if !started {
            debug!("Ignoring request for {:?}: busy", to);
        }
        started
    }

    /// State to return to once an operation ends.
    fn resting_state(&self, active: ActiveTransport) -> SessionState {
        match active.transport() {
            Some(transport) if self.session(transport).is_connected() => SessionState::Connected,
            _ => SessionState::Idle,
        }
    }

    /// Publish a status message that clears itself after a delay.
    fn report(&self, event: StatusEvent) {
        let message = event.message();
        let delay = if event.is_failure() {
            warn!("{}", message);
            Duration::from_millis(self.status.failure_clear_ms)
        } else {
            info!("{}", message);
            Duration::from_millis(self.status.success_clear_ms)
        };

        let generation = self.status_generation.clone();
        let mut current = 0;
        self.snapshot.send_modify(|s| {
            current = generation.fetch_add(1, Ordering::AcqRel) + 1;
            s.status_message = Some(message);
        });

        let snapshot = self.snapshot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            snapshot.send_if_modified(|s| {
                if generation.load(Ordering::Acquire) != current {
                    return false;
                }
                s.status_message.take().is_some()
            });
        });
    }

    pub async fn scan_wifi(&self) -> Vec<DiscoveredDevice> {
        self.scan(Transport::Wifi).await
    }

    pub async fn scan_radio(&self) -> Vec<DiscoveredDevice> {
        self.scan(Transport::Radio).await
    }

    async fn scan(&self, transport: Transport) -> Vec<DiscoveredDevice> {
        if !self.gate.is_capable(transport) {
            self.report(StatusEvent::PermissionDenied(transport));
            return Vec::new();
        }

        if !self.begin(SessionState::is_resting, SessionState::Scanning, |s| {
            s.scanning = true;
            s.devices_mut(transport).clear();
        }) {
            return Vec::new();
        }

        let timeout = self.timeouts(transport).scan;
        let devices = self.session(transport).scan(timeout).await;

        let active = self.snapshot.borrow().active_transport;
        let resting = self.resting_state(active);
        self.snapshot.send_modify(|s| {
            s.scanning = false;
            *s.devices_mut(transport) = devices.clone();
            s.state = resting;
        });

        self.report(StatusEvent::ScanFinished {
            transport,
            found: devices.len(),
        });
        devices
    }

    /// Stop a running scan on either transport.
    pub fn cancel_scan(&self) {
        if self.state() != SessionState::Scanning {
            return;
        }
        self.wifi.cancel_scan();
        self.radio.cancel_scan();
    }

    /// Connect to `device`, tearing down the other transport on success.
    pub async fn connect(&self, device: &DiscoveredDevice) -> bool {
        let transport = device.transport();
        if !self.gate.is_capable(transport) {
            self.report(StatusEvent::PermissionDenied(transport));
            return false;
        }

        let session = self.session(transport).clone();
        {
            let current = self.snapshot.borrow();
            if current.state == SessionState::Connected
                && current.connected_device.as_ref() == Some(device)
                && session.is_connected()
            {
                debug!("Already connected to {}", device.id());
                return true;
            }
        }

        if !self.begin(SessionState::is_resting, SessionState::Connecting, |_| {}) {
            return false;
        }

        info!("Connecting to {}", device.id());
        let connected = session
            .connect(device, self.timeouts(transport).connect)
            .await;

        if connected {
            self.session(transport.other()).cleanup().await;
            self.snapshot.send_modify(|s| {
                s.active_transport = transport.into();
                s.connected_device = Some(device.clone());
                s.state = SessionState::Connected;
            });
            self.report(StatusEvent::Connected {
                name: device.display_name().to_string(),
                transport,
            });
        } else {
            let mut active = self.snapshot.borrow().active_transport;
            if active.transport() == Some(transport) {
                active = ActiveTransport::None;
            }
            let resting = self.resting_state(active);
            self.snapshot.send_modify(|s| {
                s.active_transport = active;
                if active == ActiveTransport::None {
                    s.connected_device = None;
                }
                s.state = resting;
            });
            self.report(StatusEvent::ConnectFailed {
                name: device.display_name().to_string(),
            });
        }

        connected
    }

    /// Choose the file the next transfer sends.
    pub async fn select_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if self.state().is_transfer() {
            debug!("Ignoring file selection during a transfer");
            return false;
        }

        match SourceHandle::open(path).await {
            Ok(source) => {
                let selected = SelectedFile {
                    name: source.name().to_string(),
                    size: source.size(),
                };
                *self.source.lock() = Some(source);
                self.snapshot.send_modify(|s| {
                    s.selected_file = Some(selected.clone());
                    s.progress = 0.0;
                });
                self.report(StatusEvent::FileSelected {
                    name: selected.name,
                    size: selected.size,
                });
                true
            }
            Err(e) => {
                debug!("{:#}", e);
                self.report(StatusEvent::FileRejected {
                    path: path.display().to_string(),
                });
                false
            }
        }
    }

    /// Send the selected file over the active transport.
    pub async fn transfer_file(&self) -> bool {
        let Some(source) = self.source.lock().clone() else {
            debug!("No file selected");
            return false;
        };
        let Some(transport) = self.snapshot.borrow().active_transport.transport() else {
            debug!("No active transport");
            return false;
        };

        if !self.begin(
            |state| *state == SessionState::Connected,
            SessionState::Transferring,
            |s| {
                s.transferring = true;
                s.progress = 0.0;
            },
        ) {
            return false;
        }

        let snapshot = self.snapshot.clone();
        let on_progress: ProgressFn = Arc::new(move |fraction| {
            snapshot.send_if_modified(|s| {
                if !s.transferring || fraction <= s.progress {
                    return false;
                }
                s.progress = fraction.min(1.0);
                true
            });
        });

        let sent = self
            .session(transport)
            .transfer_file(&source, on_progress)
            .await;

        let (cancelled, active) = {
            let current = self.snapshot.borrow();
            (
                current.state == SessionState::Cancelling,
                current.active_transport,
            )
        };
        let resting = self.resting_state(active);
        self.snapshot.send_modify(|s| {
            s.transferring = false;
            s.progress = if sent { 1.0 } else { 0.0 };
            s.state = resting;
        });

        let name = source.name().to_string();
        self.report(if sent {
            StatusEvent::TransferComplete { name }
        } else if cancelled {
            StatusEvent::TransferCancelled
        } else {
            StatusEvent::TransferFailed { name }
        });
        sent
    }

    /// Ask the running transfer to stop at its next chunk boundary.
    pub fn cancel_transfer(&self) {
        if !self.begin(
            |state| *state == SessionState::Transferring,
            SessionState::Cancelling,
            |_| {},
        ) {
            return;
        }
        self.wifi.cancel_transfer();
        self.radio.cancel_transfer();
    }

    /// Drop the active connection.
    pub async fn disconnect(&self) {
        if !self.begin(
            |state| *state == SessionState::Connected,
            SessionState::Idle,
            |s| {
                s.active_transport = ActiveTransport::None;
                s.connected_device = None;
            },
        ) {
            return;
        }

        self.wifi.cleanup().await;
        self.radio.cleanup().await;
        self.report(StatusEvent::Disconnected);
    }

    /// Stop everything in flight and release both transports.
    pub async fn shutdown(&self) {
        info!("Shutting down device sessions");
        self.wifi.cancel_scan();
        self.radio.cancel_scan();
        self.wifi.cancel_transfer();
        self.radio.cancel_transfer();

        self.wifi.cleanup().await;
        self.radio.cleanup().await;

        let link_task = self.link_task.lock().take();
        if let Some(handle) = link_task {
            handle.abort();
        }

        self.snapshot.send_modify(|s| {
            s.state = SessionState::Idle;
            s.active_transport = ActiveTransport::None;
            s.connected_device = None;
            s.scanning = false;
            s.transferring = false;
        });
    }

    /// A session reported that its link dropped.
    pub(crate) fn handle_link_lost(&self, transport: Transport) {
        let mut affected = false;
        self.snapshot.send_if_modified(|s| {
            if s.active_transport.transport() != Some(transport) {
                return false;
            }
            s.active_transport = ActiveTransport::None;
            s.connected_device = None;
            // A running operation settles the state itself when it returns.
            if s.state == SessionState::Connected {
                s.state = SessionState::Idle;
            }
            affected = true;
            true
        });

        if affected {
            self.report(StatusEvent::LinkLost(transport));
        } else {
            debug!("Ignoring loss of inactive {} link", transport);
        }
    }
}

impl Drop for DeviceCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.link_task.lock().take() {
            handle.abort();
        }
    }
}
