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

//! BLE service and characteristic UUIDs for the image upload service.

use uuid::Uuid;

/// Upload GATT service UUID advertised by the device.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Data characteristic UUID (we write frames here).
/// Properties: Write
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Status characteristic UUID (device reports progress and errors here).
/// Properties: Notify
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x1c95d5e3_d8f7_413a_bf3d_7a2e5d7be87e);

/// BLE configuration constants.
pub mod config {
    /// Default MTU (minimum for all BLE devices).
    pub const DEFAULT_MTU: usize = 23;

    /// MTU requested right after the link comes up.
    pub const REQUESTED_MTU: usize = 517;

    /// ATT protocol overhead (3 bytes).
    pub const ATT_OVERHEAD: usize = 3;

    /// Preferred size of one data frame.
    pub const DEFAULT_CHUNK_SIZE: usize = 500;

    /// Largest attribute value that fits one write at the given MTU.
    pub fn max_write_payload(mtu: usize) -> usize {
        mtu.max(DEFAULT_MTU) - ATT_OVERHEAD
    }

    /// Data frame size to use: the preferred size, capped by the MTU.
    pub fn chunk_size_for_mtu(mtu: usize, preferred: usize) -> usize {
        preferred.clamp(1, max_write_payload(mtu))
    }
}
