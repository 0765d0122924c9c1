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

//! Receiver-side reassembly of a framed BLE upload.
//!
//! Mirrors what the device firmware does with the writes it receives, and is
//! used to check that a sequence of writes forms one valid transfer.

use tracing::{debug, warn};

use super::protocol::FramedMessage;

/// What a single write contributed to the transfer being reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Header received; `total_size` data bytes will follow.
    Started { total_size: u32 },
    /// Data frame of `len` bytes accepted.
    Data { len: usize },
    /// Trailer received after exactly `total_size` bytes.
    Completed(Vec<u8>),
}

/// Reassembles Header → Data… → Trailer write sequences.
pub struct FrameAssembler {
    buffer: Vec<u8>,
    expected_length: usize,
    in_progress: bool,
}

impl FrameAssembler {
    /// Create a new frame assembler.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            expected_length: 0,
            in_progress: false,
        }
    }

    /// Process one write.
    ///
    /// Returns `None` and resets when the write breaks the frame order.
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<FrameEvent> {
        if !self.in_progress {
            return match FramedMessage::parse_header(frame) {
                Some(total_size) => {
                    self.start(total_size);
                    Some(FrameEvent::Started { total_size })
                }
                None => {
                    warn!("Received {} byte frame without header", frame.len());
                    None
                }
            };
        }

        // Everything up to the announced length is payload, even if it
        // happens to look like a marker.
        if self.buffer.len() < self.expected_length {
            if frame.is_empty() {
                warn!("Empty data frame");
                self.reset();
                return None;
            }
            if self.buffer.len() + frame.len() > self.expected_length {
                warn!(
                    "Data overflow: expected {} bytes, got at least {}",
                    self.expected_length,
                    self.buffer.len() + frame.len()
                );
                self.reset();
                return None;
            }
            self.buffer.extend_from_slice(frame);
            return Some(FrameEvent::Data { len: frame.len() });
        }

        if FramedMessage::is_trailer(frame) {
            debug!("Transfer reassembly complete: {} bytes", self.buffer.len());
            self.in_progress = false;
            return Some(FrameEvent::Completed(std::mem::take(&mut self.buffer)));
        }

        warn!("Expected trailer after {} bytes", self.expected_length);
        self.reset();
        None
    }

    fn start(&mut self, total_size: u32) {
        self.buffer.clear();
        self.expected_length = total_size as usize;
        self.in_progress = true;
        debug!("Started transfer reassembly, expecting {} bytes", total_size);
    }

    /// Reset the assembler state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_length = 0;
        self.in_progress = false;
    }

    /// Check if reassembly is in progress.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Get current buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
