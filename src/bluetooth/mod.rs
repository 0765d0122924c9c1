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

//! Bluetooth Low Energy transport.
//!
//! Central-role session that pushes one file over a GATT write characteristic
//! using a framed Header/Data/Trailer protocol.

pub mod ble_constants;
#[cfg(feature = "bluez")]
mod connection;
pub mod platform;
pub mod protocol;
pub mod reassembler;
mod session;

#[cfg(feature = "bluez")]
pub use connection::BluezAdapter;
pub use platform::{
    Advertisement, AdvertisementStream, RadioAdapter, RadioLink, RemoteService,
    UnsupportedAdapter,
};
pub use protocol::FramedMessage;
pub use reassembler::{FrameAssembler, FrameEvent};
pub use session::RadioSession;
