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

//! ImagePush command line client.
//!
//! Usage: `imagepush <image> [wifi|radio]`

use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagepush::bluetooth::{RadioAdapter, RadioSession};
use imagepush::wifi::{NmcliRadio, WifiSession};
use imagepush::{Config, DeviceCoordinator, StaticCapabilityGate, Transport, TransportSession};

fn parse_args() -> Result<(String, Transport)> {
    let mut args = std::env::args().skip(1);
    let image = args
        .next()
        .ok_or_else(|| anyhow!("Usage: imagepush <image> [wifi|radio]"))?;

    let transport = match args.next().as_deref() {
        None | Some("radio") | Some("ble") => Transport::Radio,
        Some("wifi") => Transport::Wifi,
        Some(other) => bail!("Unknown transport '{}', expected wifi or radio", other),
    };

    Ok((image, transport))
}

#[cfg(feature = "bluez")]
async fn radio_adapter() -> Arc<dyn RadioAdapter> {
    match imagepush::bluetooth::BluezAdapter::new().await {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            warn!("BLE unavailable: {:#}", e);
            Arc::new(imagepush::bluetooth::UnsupportedAdapter)
        }
    }
}

#[cfg(not(feature = "bluez"))]
async fn radio_adapter() -> Arc<dyn RadioAdapter> {
    Arc::new(imagepush::bluetooth::UnsupportedAdapter)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imagepush=info".parse()?),
        )
        .init();

    info!("Starting ImagePush v{}...", env!("CARGO_PKG_VERSION"));

    let (image, transport) = parse_args()?;

    let config = Config::load()?;
    info!("Configuration loaded");

    let wifi: Arc<dyn TransportSession> = Arc::new(WifiSession::new(
        Arc::new(NmcliRadio::new()),
        config.wifi.clone(),
    ));
    let radio: Arc<dyn TransportSession> =
        Arc::new(RadioSession::new(radio_adapter().await, config.radio.clone()));
    let gate = Arc::new(StaticCapabilityGate::from_config(&config.capabilities));

    let coordinator = DeviceCoordinator::new(wifi, radio, gate, &config);

    // Log every snapshot change
    let mut snapshots = coordinator.subscribe();
    let observer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            info!(
                "[{}] progress {:.0}%{}",
                snapshot.state.as_str(),
                snapshot.progress * 100.0,
                snapshot
                    .status_message
                    .map(|m| format!(" - {}", m))
                    .unwrap_or_default()
            );
        }
    });

    let run = run(coordinator.clone(), image, transport);
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                coordinator.cancel_scan();
                coordinator.cancel_transfer();
            }
        }
    };

    coordinator.shutdown().await;
    observer.abort();

    match &outcome {
        Ok(()) => info!("ImagePush stopped"),
        Err(e) => error!("{:#}", e),
    }
    outcome
}

async fn run(coordinator: Arc<DeviceCoordinator>, image: String, transport: Transport) -> Result<()> {
    if !coordinator.select_file(&image).await {
        bail!("Cannot read {}", image);
    }

    let devices = match transport {
        Transport::Wifi => coordinator.scan_wifi().await,
        Transport::Radio => coordinator.scan_radio().await,
    };
    let device = devices
        .first()
        .ok_or_else(|| anyhow!("No devices found over {}", transport))?;

    if !coordinator.connect(device).await {
        bail!("Could not connect to {}", device.display_name());
    }

    if !coordinator.transfer_file().await {
        bail!("Transfer of {} did not complete", image);
    }

    Ok(())
}
