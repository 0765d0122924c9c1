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

//! Transfer bookkeeping shared by both sessions.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Progress callback, invoked with a fraction in `[0.0, 1.0]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Opaque reference to the file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    path: PathBuf,
    name: String,
    size: u64,
}

impl SourceHandle {
    /// Resolve a path into a handle, reading its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;

        if !metadata.is_file() {
            return Err(anyhow!("{} is not a regular file", path.display()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A single upload in flight. Owned by the session running it.
#[derive(Debug)]
pub struct TransferJob {
    source: SourceHandle,
    total_bytes: u64,
    bytes_sent: AtomicU64,
    cancelled: AtomicBool,
}

impl TransferJob {
    pub fn new(source: SourceHandle) -> Self {
        let total_bytes = source.size();
        Self {
            source,
            total_bytes,
            bytes_sent: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Acquire)
    }

    /// Account for `n` more bytes written and return the new fraction.
    pub fn record_sent(&self, n: u64) -> f64 {
        let sent = self.bytes_sent.fetch_add(n, Ordering::AcqRel) + n;
        fraction(sent, self.total_bytes)
    }

    pub fn progress(&self) -> f64 {
        fraction(self.bytes_sent(), self.total_bytes)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

fn fraction(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (sent as f64 / total as f64).min(1.0)
}

/// Rate limiter for progress callbacks.
///
/// The first report and the final (1.0) report always pass.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn should_report(&mut self, fraction: f64) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => true,
            Some(last) => fraction >= 1.0 || now.duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}
