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

//! Status events and link event processing.

use std::sync::Weak;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::coordinator::DeviceCoordinator;
use crate::device::Transport;
use crate::transport::LinkEvent;

/// Failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Scan,
    Connect,
    Transfer,
    Cancelled,
    Permission,
    Disconnected,
}

/// Outcome of a coordinator operation, rendered as a short status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    ScanFinished { transport: Transport, found: usize },
    PermissionDenied(Transport),
    Connected { name: String, transport: Transport },
    ConnectFailed { name: String },
    FileSelected { name: String, size: u64 },
    FileRejected { path: String },
    TransferComplete { name: String },
    TransferFailed { name: String },
    TransferCancelled,
    Disconnected,
    LinkLost(Transport),
}

impl StatusEvent {
    pub fn message(&self) -> String {
        match self {
            StatusEvent::ScanFinished { transport, found: 0 } => {
                format!("No devices found over {}", transport)
            }
            StatusEvent::ScanFinished { transport, found } => {
                format!("Found {} device(s) over {}", found, transport)
            }
            StatusEvent::PermissionDenied(transport) => {
                format!("{} access not granted", transport)
            }
            StatusEvent::Connected { name, transport } => {
                format!("Connected to {} over {}", name, transport)
            }
            StatusEvent::ConnectFailed { name } => format!("Could not connect to {}", name),
            StatusEvent::FileSelected { name, size } => format!("Selected {} ({} bytes)", name, size),
            StatusEvent::FileRejected { path } => format!("Cannot read {}", path),
            StatusEvent::TransferComplete { name } => format!("Sent {}", name),
            StatusEvent::TransferFailed { name } => format!("Failed to send {}", name),
            StatusEvent::TransferCancelled => "Transfer cancelled".to_string(),
            StatusEvent::Disconnected => "Disconnected".to_string(),
            StatusEvent::LinkLost(transport) => format!("{} connection lost", transport),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StatusEvent::ScanFinished { found: 0, .. } => Some(FailureKind::Scan),
            StatusEvent::PermissionDenied(_) => Some(FailureKind::Permission),
            StatusEvent::ConnectFailed { .. } => Some(FailureKind::Connect),
            StatusEvent::FileRejected { .. } | StatusEvent::TransferFailed { .. } => {
                Some(FailureKind::Transfer)
            }
            StatusEvent::TransferCancelled => Some(FailureKind::Cancelled),
            StatusEvent::LinkLost(_) => Some(FailureKind::Disconnected),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure_kind().is_some()
    }
}

/// Forwards link events raised by the sessions to the coordinator.
pub struct EventProcessor {
    coordinator: Weak<DeviceCoordinator>,
}

impl EventProcessor {
    pub fn new(coordinator: Weak<DeviceCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Process events until the channel closes or the coordinator is gone.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = rx.recv().await {
            if !self.process_event(event) {
                break;
            }
        }
        debug!("Link event processor stopped");
    }

    /// Returns false once the coordinator has been dropped.
    pub fn process_event(&self, event: LinkEvent) -> bool {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return false;
        };

        match event {
            LinkEvent::Lost(transport) => {
                info!("{} link lost", transport);
                coordinator.handle_link_lost(transport);
            }
        }
        true
    }
}
