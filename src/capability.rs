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

//! Per-transport capability checks.
//!
//! Reflects whether the host granted what a transport needs (adapter access,
//! network management rights). Consulted before every scan and connect.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::CapabilityConfig;
use crate::device::Transport;

/// Answers whether a transport may be used right now.
pub trait CapabilityGate: Send + Sync {
    fn is_wifi_capable(&self) -> bool;

    fn is_radio_capable(&self) -> bool;

    fn is_capable(&self, transport: Transport) -> bool {
        match transport {
            Transport::Wifi => self.is_wifi_capable(),
            Transport::Radio => self.is_radio_capable(),
        }
    }
}

/// Gate with flags set by whoever owns the permission plumbing.
#[derive(Debug)]
pub struct StaticCapabilityGate {
    wifi: AtomicBool,
    radio: AtomicBool,
}

impl StaticCapabilityGate {
    pub fn new(wifi: bool, radio: bool) -> Self {
        Self {
            wifi: AtomicBool::new(wifi),
            radio: AtomicBool::new(radio),
        }
    }

    pub fn from_config(config: &CapabilityConfig) -> Self {
        Self::new(config.wifi, config.radio)
    }

    pub fn set_wifi_capable(&self, capable: bool) {
        self.wifi.store(capable, Ordering::Release);
    }

    pub fn set_radio_capable(&self, capable: bool) {
        self.radio.store(capable, Ordering::Release);
    }
}

impl Default for StaticCapabilityGate {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl CapabilityGate for StaticCapabilityGate {
    fn is_wifi_capable(&self) -> bool {
        self.wifi.load(Ordering::Acquire)
    }

    fn is_radio_capable(&self) -> bool {
        self.radio.load(Ordering::Acquire)
    }
}
