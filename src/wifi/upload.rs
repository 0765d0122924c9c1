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

//! HTTP side of the Wi-Fi transport: reachability probe and streaming upload.

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::platform::JoinedNetwork;
use crate::transport::{ProgressFn, ProgressThrottle, TransferJob};

/// Path of the device's upload endpoint.
pub const UPLOAD_PATH: &str = "/upload";

/// Multipart field name the device expects the image under.
pub const FILE_FIELD: &str = "file";

/// Build a client whose sockets are bound to the joined network.
pub fn build_client(network: &JoinedNetwork, timeout: Duration) -> Result<Client> {
    let builder = Client::builder().timeout(timeout);

    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    let builder = match network.interface.as_deref() {
        Some(iface) => {
            debug!("Binding HTTP client to {}", iface);
            builder.interface(iface)
        }
        None => builder,
    };
    #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
    let _ = network;

    builder.build().context("Failed to build HTTP client")
}

/// HEAD the device root. Any HTTP response counts as reachable.
pub async fn probe(client: &Client, base_url: &str) -> Result<()> {
    let url = format!("{}/", base_url);
    let response = client
        .head(&url)
        .send()
        .await
        .with_context(|| format!("Device at {} is not reachable", base_url))?;

    let status = response.status();
    if status.is_server_error() {
        warn!("Device answered probe with {}", status);
    } else {
        debug!("Device answered probe with {}", status);
    }
    Ok(())
}

/// Stream `staged` to the device as a multipart upload.
///
/// Returns whether the device answered with a 2xx status. The cancel flag on
/// `job` is checked before every chunk is handed to the connection.
///
/// Progress counts file bytes, not the multipart framing around them. A chunk
/// is counted once the connection asks for the next one, so the reported
/// fraction trails what has been handed to the socket.
pub async fn upload(
    client: &Client,
    base_url: &str,
    staged: &Path,
    job: Arc<TransferJob>,
    chunk_size: usize,
    progress_interval: Duration,
    on_progress: ProgressFn,
) -> Result<bool> {
    let file = tokio::fs::File::open(staged)
        .await
        .with_context(|| format!("Cannot open staged copy {}", staged.display()))?;
    let total = job.total_bytes();
    let file_name = job.source().name().to_string();

    let body_job = job.clone();
    let chunks = async_stream::stream! {
        let mut file = file;
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut throttle = ProgressThrottle::new(progress_interval);

        loop {
            if body_job.is_cancelled() {
                yield Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
                break;
            }

            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    yield Ok(buf[..n].to_vec());

                    // Resumed only after the previous chunk was taken.
                    let fraction = body_job.record_sent(n as u64);
                    if throttle.should_report(fraction) {
                        on_progress(fraction);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };

    let part = Part::stream_with_length(Body::wrap_stream(chunks), total)
        .file_name(file_name)
        .mime_str("application/octet-stream")?;
    let form = Form::new().part(FILE_FIELD, part);

    let url = format!("{}{}", base_url, UPLOAD_PATH);
    debug!("POST {} ({} bytes)", url, total);

    let response = client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .context("Upload request failed")?;

    let status = response.status();
    if job.is_cancelled() {
        debug!("Upload finished with {} after cancellation", status);
        return Ok(false);
    }
    if !status.is_success() {
        warn!("Device rejected upload with {}", status);
    }
    Ok(status.is_success())
}
