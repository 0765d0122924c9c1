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

//! Transport session abstraction shared by the Wi-Fi and BLE sessions.

mod job;
mod slot;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::device::{DiscoveredDevice, Transport};

pub use job::{ProgressFn, ProgressThrottle, SourceHandle, TransferJob};
pub use slot::ResultSlot;

/// Events a session raises on its own, outside of any call made on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A previously established link dropped.
    Lost(Transport),
}

/// Sender half handed to sessions so they can report link events.
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Discovery, connection and transfer lifecycle for one transport.
///
/// No method returns an error: scan failures yield an empty list, connect
/// and transfer failures yield `false`. The boolean returned by
/// [`TransportSession::transfer_file`] is the completion signal and is
/// produced exactly once per call.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// The transport this session drives.
    fn transport(&self) -> Transport;

    /// Scan for target devices until `timeout` elapses or the scan is cancelled.
    async fn scan(&self, timeout: Duration) -> Vec<DiscoveredDevice>;

    /// Stop a running scan. Idempotent.
    fn cancel_scan(&self);

    /// Connect to `device`, resolving `true` only once the link is usable.
    async fn connect(&self, device: &DiscoveredDevice, timeout: Duration) -> bool;

    /// Push `source` to the connected device.
    async fn transfer_file(&self, source: &SourceHandle, on_progress: ProgressFn) -> bool;

    /// Request cooperative cancellation of the running transfer.
    fn cancel_transfer(&self);

    /// Release the link and any pending listeners. Idempotent.
    async fn cleanup(&self);

    /// Whether a link is currently established.
    fn is_connected(&self) -> bool;

    /// The device the link is established with, if any.
    fn connected_device(&self) -> Option<DiscoveredDevice>;

    /// Register the channel link events are reported on.
    fn set_link_observer(&self, tx: LinkEventSender);
}
