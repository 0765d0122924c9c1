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

//! Framing for the BLE upload stream.
//!
//! A transfer is written as exactly one header, one data frame per chunk and
//! one trailer, with no other writes interleaved:
//!
//! ```text
//! FILE_START:<decimal size>   raw chunk bytes ...   FILE_END
//! ```

use anyhow::{anyhow, Result};
use std::fmt;

/// Prefix of the header frame; the decimal byte count follows.
pub const HEADER_PREFIX: &[u8] = b"FILE_START:";

/// The trailer frame.
pub const TRAILER: &[u8] = b"FILE_END";

/// One discrete write in the upload protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedMessage {
    /// Announces the total number of data bytes that follow.
    Header { total_size: u32 },
    /// A slice of the file, at most one chunk long.
    Data(Vec<u8>),
    /// Marks the end of the file.
    Trailer,
}

impl FramedMessage {
    /// Header for a file of `len` bytes.
    pub fn header_for_len(len: u64) -> Result<Self> {
        let total_size =
            u32::try_from(len).map_err(|_| anyhow!("File too large for BLE upload: {} bytes", len))?;
        Ok(Self::Header { total_size })
    }

    /// Serialize to the bytes written to the data characteristic.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Header { total_size } => {
                let mut bytes = HEADER_PREFIX.to_vec();
                bytes.extend_from_slice(total_size.to_string().as_bytes());
                bytes
            }
            Self::Data(payload) => payload.clone(),
            Self::Trailer => TRAILER.to_vec(),
        }
    }

    /// Parse a header frame, returning the announced size.
    pub fn parse_header(frame: &[u8]) -> Option<u32> {
        let digits = frame.strip_prefix(HEADER_PREFIX)?;
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        std::str::from_utf8(digits).ok()?.parse().ok()
    }

    pub fn is_trailer(frame: &[u8]) -> bool {
        frame == TRAILER
    }
}

/// Number of data frames needed to carry `total` bytes.
pub fn data_frame_count(total: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size as u64)
}

impl fmt::Display for FramedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { total_size } => write!(f, "Header({})", total_size),
            Self::Data(payload) => write!(f, "Data({})", payload.len()),
            Self::Trailer => f.write_str("Trailer"),
        }
    }
}
