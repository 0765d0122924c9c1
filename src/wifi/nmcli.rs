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

//! NetworkManager backend driven through `nmcli`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::process::Command;
use tracing::{debug, info};

use super::platform::{AccessPoint, JoinedNetwork, WifiRadio};

const NMCLI: &str = "nmcli";

/// Wi-Fi radio backed by the NetworkManager command line client.
pub struct NmcliRadio {
    /// Restrict operations to this interface (e.g. `wlan0`).
    interface: Option<String>,
}

impl NmcliRadio {
    pub fn new() -> Self {
        Self { interface: None }
    }

    /// Use a specific wireless interface instead of letting NetworkManager pick.
    pub fn with_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: Some(interface.into()),
        }
    }

    /// Run nmcli and return its stdout. `secret` is masked in the debug log.
    async fn run(&self, args: &[&str], secret: Option<&str>) -> Result<String> {
        let shown: Vec<&str> = args
            .iter()
            .map(|a| match secret {
                Some(s) if *a == s => "********",
                _ => *a,
            })
            .collect();
        debug!("Running: {} {:?}", NMCLI, shown);

        let output = Command::new(NMCLI)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow!("Failed to run {}: {}", NMCLI, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} failed: {}", NMCLI, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn device_status(&self) -> Result<String> {
        self.run(
            &["-t", "-f", "DEVICE,TYPE,STATE,CONNECTION", "device", "status"],
            None,
        )
        .await
    }
}

impl Default for NmcliRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WifiRadio for NmcliRadio {
    async fn scan(&self) -> Result<Vec<AccessPoint>> {
        let mut args = vec!["-t", "-f", "SSID,SIGNAL", "device", "wifi", "list"];
        if let Some(iface) = &self.interface {
            args.extend(["ifname", iface.as_str()]);
        }
        args.extend(["--rescan", "yes"]);

        let output = self.run(&args, None).await.context("Wi-Fi scan failed")?;
        Ok(parse_scan(&output))
    }

    async fn join(&self, ssid: &str, passphrase: &str) -> Result<JoinedNetwork> {
        info!("Joining access point {}", ssid);

        let mut args = vec!["device", "wifi", "connect", ssid, "password", passphrase];
        if let Some(iface) = &self.interface {
            args.extend(["ifname", iface.as_str()]);
        }
        self.run(&args, Some(passphrase))
            .await
            .with_context(|| format!("Joining {} failed", ssid))?;

        let status = self.device_status().await?;
        let interface = find_interface(&status, ssid).or_else(|| self.interface.clone());
        debug!("{} is carried by {:?}", ssid, interface);

        Ok(JoinedNetwork {
            ssid: ssid.to_string(),
            interface,
        })
    }

    async fn is_link_active(&self, network: &JoinedNetwork) -> Result<bool> {
        let status = self.device_status().await?;
        Ok(find_interface(&status, &network.ssid).is_some())
    }

    async fn leave(&self, network: &JoinedNetwork) -> Result<()> {
        info!("Leaving access point {}", network.ssid);
        self.run(&["connection", "down", "id", &network.ssid], None)
            .await
            .with_context(|| format!("Leaving {} failed", network.ssid))?;
        Ok(())
    }
}

/// Split one line of `nmcli -t` output, honouring `\:` and `\\` escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parse `SSID:SIGNAL` lines, keeping the strongest entry per SSID.
fn parse_scan(output: &str) -> Vec<AccessPoint> {
    let mut strongest: HashMap<String, i32> = HashMap::new();
    let mut order = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields = split_terse(line);
        let Some(ssid) = fields.first().filter(|s| !s.is_empty()) else {
            continue;
        };
        let signal = fields
            .get(1)
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);

        match strongest.get_mut(ssid) {
            Some(best) => *best = (*best).max(signal),
            None => {
                strongest.insert(ssid.clone(), signal);
                order.push(ssid.clone());
            }
        }
    }

    order
        .into_iter()
        .map(|ssid| AccessPoint {
            signal_level: strongest[&ssid],
            ssid,
        })
        .collect()
}

/// Find the wireless interface connected to `ssid` in `device status` output.
fn find_interface(output: &str, ssid: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields = split_terse(line);
        match fields.as_slice() {
            [device, kind, state, connection, ..]
                if kind == "wifi" && state.starts_with("connected") && connection == ssid =>
            {
                Some(device.clone())
            }
            _ => None,
        }
    })
}
