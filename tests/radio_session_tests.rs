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

//! BLE session tests against a recording GATT link.

mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use common::{advertisement, pattern_file, radio_device, MockRadioAdapter, MockRadioLink};
use imagepush::bluetooth::ble_constants::SERVICE_UUID;
use imagepush::bluetooth::{FrameAssembler, FrameEvent, RadioSession, RemoteService};
use imagepush::config::RadioConfig;
use imagepush::transport::{LinkEvent, ProgressFn, SourceHandle};
use imagepush::{Transport, TransportSession};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> RadioConfig {
    RadioConfig {
        pacing_ms: 1,
        ..Default::default()
    }
}

fn session_with(link: Arc<MockRadioLink>) -> (Arc<RadioSession>, Arc<MockRadioAdapter>) {
    let adapter = Arc::new(MockRadioAdapter::new(Vec::new(), link));
    let session = Arc::new(RadioSession::new(adapter.clone(), config()));
    (session, adapter)
}

async fn connected(link: Arc<MockRadioLink>) -> (Arc<RadioSession>, Arc<MockRadioAdapter>) {
    let (session, adapter) = session_with(link);
    let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
    assert!(session.connect(&device, CONNECT_TIMEOUT).await);
    (session, adapter)
}

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let on_progress: ProgressFn = Arc::new(move |fraction| sink.lock().push(fraction));
    (on_progress, seen)
}

#[tokio::test]
async fn test_transfer_frame_sequence() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = connected(link.clone()).await;
    assert!(link.notifications_enabled.load(std::sync::atomic::Ordering::SeqCst));

    let (file, data) = pattern_file(1337);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, seen) = recorder();

    assert!(session.transfer_file(&source, on_progress).await);

    let writes = link.writes();
    assert_eq!(writes.len(), 5);
    assert_eq!(writes[0], b"FILE_START:1337");
    assert_eq!(writes[1].len(), 500);
    assert_eq!(writes[2].len(), 500);
    assert_eq!(writes[3].len(), 337);
    assert_eq!(writes[4], b"FILE_END");

    let mut assembler = FrameAssembler::new();
    let mut last = None;
    for write in &writes {
        last = assembler.process_frame(write);
        assert!(last.is_some());
    }
    assert_eq!(last, Some(FrameEvent::Completed(data)));

    let progress = seen.lock().clone();
    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_empty_file_sends_header_and_trailer() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = connected(link.clone()).await;

    let (file, _) = pattern_file(0);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, _) = recorder();

    assert!(session.transfer_file(&source, on_progress).await);
    assert_eq!(link.writes(), vec![b"FILE_START:0".to_vec(), b"FILE_END".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_scan_dedupes_and_filters() {
    let link = Arc::new(MockRadioLink::new());
    let adapter = Arc::new(MockRadioAdapter::new(
        vec![
            advertisement("AA:BB:CC:DD:EE:01", Some("ESP32_Cam")),
            advertisement("aa:bb:cc:dd:ee:01", Some("ESP32_Cam")),
            advertisement("AA:BB:CC:DD:EE:02", Some("HomeSpeaker")),
            advertisement("AA:BB:CC:DD:EE:03", None),
            advertisement("AA:BB:CC:DD:EE:04", Some("esp_sensor")),
        ],
        link,
    ));
    let session = RadioSession::new(adapter.clone(), config());

    let start = tokio::time::Instant::now();
    let devices = session.scan(Duration::from_secs(2)).await;
    let elapsed = start.elapsed();

    let names: Vec<&str> = devices.iter().map(|d| d.display_name()).collect();
    assert_eq!(names, vec!["ESP32_Cam", "esp_sensor"]);
    assert!(devices.iter().all(|d| d.transport() == Transport::Radio));
    assert_eq!(adapter.scan_filters.lock().clone(), vec![Some(SERVICE_UUID)]);

    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_scan_cancel() {
    let link = Arc::new(MockRadioLink::new());
    let adapter = Arc::new(MockRadioAdapter::new(
        vec![advertisement("AA:BB:CC:DD:EE:01", Some("ESP32_Cam"))],
        link,
    ));
    let session = Arc::new(RadioSession::new(adapter, config()));

    let scanner = session.clone();
    let start = tokio::time::Instant::now();
    let scan = tokio::spawn(async move { scanner.scan(Duration::from_secs(30)).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.cancel_scan();
    session.cancel_scan();

    let devices = scan.await.unwrap();
    assert_eq!(devices.len(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_scan_bound_covers_slow_discovery_start() {
    let link = Arc::new(MockRadioLink::new());
    let mut adapter = MockRadioAdapter::new(
        vec![advertisement("AA:BB:CC:DD:EE:01", Some("ESP32_Cam"))],
        link,
    );
    adapter.scan_start_delay = Duration::from_secs(60);
    let session = RadioSession::new(Arc::new(adapter), config());

    let start = tokio::time::Instant::now();
    let devices = session.scan(Duration::from_secs(10)).await;
    let elapsed = start.elapsed();

    assert!(devices.is_empty());
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_millis(10_100));
}

#[tokio::test(start_paused = true)]
async fn test_scan_window_includes_discovery_start() {
    let link = Arc::new(MockRadioLink::new());
    let mut adapter = MockRadioAdapter::new(
        vec![advertisement("AA:BB:CC:DD:EE:01", Some("ESP32_Cam"))],
        link,
    );
    adapter.scan_start_delay = Duration::from_secs(1);
    let session = RadioSession::new(Arc::new(adapter), config());

    let start = tokio::time::Instant::now();
    let devices = session.scan(Duration::from_secs(2)).await;
    let elapsed = start.elapsed();

    assert_eq!(devices.len(), 1);
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2100));
}

#[tokio::test]
async fn test_chunks_follow_negotiated_mtu() {
    let mut link = MockRadioLink::new();
    link.mtu = 185;
    let link = Arc::new(link);
    let (session, _adapter) = connected(link.clone()).await;
    assert_eq!(*link.requested_mtu.lock(), Some(517));

    let (file, data) = pattern_file(400);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, _) = recorder();

    assert!(session.transfer_file(&source, on_progress).await);

    let writes = link.writes();
    let sizes: Vec<usize> = writes[1..writes.len() - 1].iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![182, 182, 36]);
    assert_eq!(writes[1..writes.len() - 1].concat(), data);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_during_handshake_fails_connect() {
    let mut link = MockRadioLink::new();
    link.hang_discovery = true;
    let link = Arc::new(link);
    let (session, _adapter) = session_with(link.clone());

    let connecting = {
        let session = session.clone();
        let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
        tokio::spawn(async move { session.connect(&device, CONNECT_TIMEOUT).await })
    };
    let start = tokio::time::Instant::now();

    tokio::time::sleep(Duration::from_millis(100)).await;
    link.drop_link();

    assert!(!connecting.await.unwrap());
    assert!(start.elapsed() < CONNECT_TIMEOUT);
    assert!(link.disconnects.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    assert!(!link.notifications_enabled.load(std::sync::atomic::Ordering::SeqCst));
    assert!(!session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_releases_link() {
    let mut link = MockRadioLink::new();
    link.hang_discovery = true;
    let link = Arc::new(link);
    let (session, _adapter) = session_with(link.clone());

    let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
    let start = tokio::time::Instant::now();
    assert!(!session.connect(&device, CONNECT_TIMEOUT).await);
    let elapsed = start.elapsed();

    assert!(elapsed >= CONNECT_TIMEOUT);
    assert!(elapsed < CONNECT_TIMEOUT + Duration::from_millis(100));
    assert_eq!(link.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(!link.connected.load(std::sync::atomic::Ordering::SeqCst));
    assert!(!session.is_connected());

    // Nothing left to release.
    session.cleanup().await;
    assert_eq!(link.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handshake_fails_without_service() {
    let link = Arc::new(MockRadioLink::with_services(vec![RemoteService {
        uuid: uuid::Uuid::from_u128(0x1234),
        characteristics: Vec::new(),
    }]));
    let (session, _adapter) = session_with(link.clone());

    let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
    assert!(!session.connect(&device, CONNECT_TIMEOUT).await);
    assert!(!session.is_connected());
    assert!(session.connected_device().is_none());
    assert!(link.disconnects.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_connect_rejected_by_adapter() {
    let link = Arc::new(MockRadioLink::new());
    let mut adapter = MockRadioAdapter::new(Vec::new(), link);
    adapter.connect_fails = true;
    let session = RadioSession::new(Arc::new(adapter), config());

    let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
    assert!(!session.connect(&device, CONNECT_TIMEOUT).await);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_connect_rejects_wifi_device() {
    let link = Arc::new(MockRadioLink::new());
    let (session, adapter) = session_with(link);

    assert!(!session.connect(&common::wifi_device("ESP32_Cam"), CONNECT_TIMEOUT).await);
    assert!(adapter.connects.lock().is_empty());
}

#[tokio::test]
async fn test_connect_same_device_is_noop() {
    let link = Arc::new(MockRadioLink::new());
    let (session, adapter) = connected(link).await;

    let device = radio_device("ESP32_Cam", "AA:BB:CC:DD:EE:01");
    assert!(session.connect(&device, CONNECT_TIMEOUT).await);
    assert_eq!(adapter.connects.lock().len(), 1);
    assert_eq!(session.connected_device(), Some(device));
}

#[tokio::test]
async fn test_transfer_requires_connection() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = session_with(link.clone());

    let (file, _) = pattern_file(100);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, seen) = recorder();

    assert!(!session.transfer_file(&source, on_progress).await);
    assert!(link.writes().is_empty());
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_skips_trailer() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = connected(link.clone()).await;

    let canceller = session.clone();
    *link.on_write.lock() = Some(Box::new(move |count| {
        if count == 2 {
            canceller.cancel_transfer();
        }
    }));

    let (file, _) = pattern_file(1337);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, _) = recorder();

    assert!(!session.transfer_file(&source, on_progress).await);

    let writes = link.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], b"FILE_START:1337");
    assert!(!writes.iter().any(|w| w.as_slice() == b"FILE_END"));

    // The link survives a cancelled transfer.
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_link_loss_during_transfer() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = connected(link.clone()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_link_observer(tx);

    let dropper = link.clone();
    *link.on_write.lock() = Some(Box::new(move |count| {
        if count == 3 {
            dropper.drop_link();
        }
    }));

    let (file, _) = pattern_file(1337);
    let source = SourceHandle::open(file.path()).await.unwrap();
    let (on_progress, _) = recorder();

    assert!(!session.transfer_file(&source, on_progress).await);
    assert_eq!(link.writes().len(), 3);

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(LinkEvent::Lost(Transport::Radio)));
    assert!(!session.is_connected());
    assert!(session.connected_device().is_none());
}

#[tokio::test]
async fn test_cleanup_is_silent_and_idempotent() {
    let link = Arc::new(MockRadioLink::new());
    let (session, _adapter) = connected(link.clone()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_link_observer(tx);

    session.cleanup().await;
    session.cleanup().await;

    assert!(!session.is_connected());
    assert_eq!(link.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}
