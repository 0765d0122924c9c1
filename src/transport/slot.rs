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

//! Single-resolution result slot.
//!
//! Bridges callback-style platform events into one awaited outcome. Several
//! producers may race to resolve the slot; only the first value is delivered.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

pub struct ResultSlot<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T: Send> ResultSlot<T> {
    /// Create a slot and the receiver its outcome is delivered to.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Resolve the slot.
    ///
    /// Returns the value back if the slot was already resolved or nobody is
    /// waiting any more, so the caller can release what it carries.
    pub fn resolve(&self, value: T) -> Result<(), T> {
        let sender = self.sender.lock().take();
        match sender {
            Some(tx) => tx.send(value),
            None => Err(value),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }
}
