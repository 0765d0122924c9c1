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

//! Session state as seen by observers.

use serde::Serialize;

use crate::device::{DiscoveredDevice, Transport};

/// Coordinator state. Exactly one per coordinator; transitions are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Transferring,
    Cancelling,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning...",
            SessionState::Connecting => "Connecting...",
            SessionState::Connected => "Connected",
            SessionState::Transferring => "Transferring...",
            SessionState::Cancelling => "Cancelling...",
        }
    }

    /// States a new scan or connect may start from.
    pub fn is_resting(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Connected)
    }

    /// Whether a transfer is running or winding down.
    pub fn is_transfer(&self) -> bool {
        matches!(self, SessionState::Transferring | SessionState::Cancelling)
    }
}

/// Transport currently holding the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ActiveTransport {
    #[default]
    None,
    Wifi,
    Radio,
}

impl ActiveTransport {
    pub fn transport(&self) -> Option<Transport> {
        match self {
            ActiveTransport::None => None,
            ActiveTransport::Wifi => Some(Transport::Wifi),
            ActiveTransport::Radio => Some(Transport::Radio),
        }
    }
}

impl From<Transport> for ActiveTransport {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Wifi => ActiveTransport::Wifi,
            Transport::Radio => ActiveTransport::Radio,
        }
    }
}

/// File chosen for the next transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
}

/// Everything an observer needs to render the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub active_transport: ActiveTransport,
    pub selected_file: Option<SelectedFile>,
    pub scanning: bool,
    pub wifi_devices: Vec<DiscoveredDevice>,
    pub radio_devices: Vec<DiscoveredDevice>,
    pub connected_device: Option<DiscoveredDevice>,
    pub transferring: bool,
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f64,
    pub status_message: Option<String>,
}

impl SessionSnapshot {
    /// Devices found by the last scan of `transport`.
    pub fn devices(&self, transport: Transport) -> &[DiscoveredDevice] {
        match transport {
            Transport::Wifi => &self.wifi_devices,
            Transport::Radio => &self.radio_devices,
        }
    }

    pub(crate) fn devices_mut(&mut self, transport: Transport) -> &mut Vec<DiscoveredDevice> {
        match transport {
            Transport::Wifi => &mut self.wifi_devices,
            Transport::Radio => &mut self.radio_devices,
        }
    }
}
