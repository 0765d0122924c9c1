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

//! ImagePush: discover ESP32 devices over Wi-Fi or BLE and push one image to
//! the device you connect to.

pub mod bluetooth;
pub mod capability;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod events;
pub mod state;
pub mod transport;
pub mod wifi;

pub use capability::{CapabilityGate, StaticCapabilityGate};
pub use config::Config;
pub use coordinator::DeviceCoordinator;
pub use device::{DiscoveredDevice, RadioDevice, Transport, WifiDevice};
pub use state::{ActiveTransport, SessionSnapshot, SessionState};
pub use transport::TransportSession;
