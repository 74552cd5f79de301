//! # Session Tests
//!
//! End-to-end behaviour of [`PrinterSession`] against the scripted mock
//! adapter. Every test runs on a paused clock, so connect timeouts and
//! transfer pacing are checked in virtual time.
//!
//! ## Test Coverage
//!
//! - **Printing**: exact bytes for text, feed, cut and raw sends
//! - **Transfer**: chunk sizes, pacing, MTU cap, retry and abort
//! - **Connection**: BLE first, Classic fallback only for bonded devices,
//!   idempotent disconnect, cancellation, health checks
//! - **Discovery**: scan results, paired device records

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use silver_printer::config::SessionConfig;
use silver_printer::document::{DocumentItem, ImageItem, PrintSettings, TextRun};
use silver_printer::ir::{Op, Program};
use silver_printer::protocol::text::{Alignment, TextSize};
use silver_printer::render::raster::PixelGrid;
use silver_printer::transport::mock::{GattBehavior, MockAdapter, RfcommBehavior};
use silver_printer::transport::{Device, DeviceKind, WriteMode};
use silver_printer::{ConnectionState, PrinterError, PrinterSession, PrinterStatus};

const BONDED_MAC: &str = "00:11:62:AA:BB:CC";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn session(adapter: &MockAdapter) -> PrinterSession {
    PrinterSession::new(Arc::new(adapter.clone()), SessionConfig::default())
}

/// A session already connected over BLE with the given GATT profile.
async fn connected(gatt: GattBehavior) -> (PrinterSession, MockAdapter) {
    let adapter = MockAdapter::new().with_gatt(gatt);
    let session = session(&adapter);
    assert!(session.connect("printer-1").await.unwrap());
    (session, adapter)
}

fn chunk_lengths(adapter: &MockAdapter) -> Vec<usize> {
    adapter.writes().iter().map(|w| w.data.len()).collect()
}

fn drain<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> Vec<T> {
    let mut seen = Vec::new();
    while let Ok(value) = rx.try_recv() {
        seen.push(value);
    }
    seen
}

// ============================================================================
// PRINTING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_print_text_centered_bold() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let settings = PrintSettings {
        alignment: Some(Alignment::Center),
        bold: Some(true),
        ..Default::default()
    };

    assert!(session.print_text("Hello", &settings).await.unwrap());

    let mut expected = vec![
        0x1B, 0x40, // init
        0x1D, 0x21, 0x00, // normal size
        0x1B, 0x45, 0x01, // bold on
        0x1B, 0x61, 0x01, // center
        0x1B, 0x74, 0x11, // code page
    ];
    expected.extend(b"Hello\n");
    expected.extend([
        0x1B, 0x21, 0x00, 0x1D, 0x21, 0x00, 0x1B, 0x2D, 0x00, 0x1B, 0x45, 0x00, 0x1B, 0x61, 0x00,
    ]);
    assert_eq!(adapter.written_bytes(), expected);
    assert_eq!(session.printer_status().await, PrinterStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_print_text_feed_lines_appended() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let settings = PrintSettings {
        font_size: Some(TextSize::Large),
        feed_lines: Some(2),
        ..Default::default()
    };

    assert!(session.print_text("Hi", &settings).await.unwrap());

    let bytes = adapter.written_bytes();
    assert_eq!(&bytes[2..5], &[0x1D, 0x21, 0x11]);
    assert_eq!(&bytes[bytes.len() - 2..], &[0x0A, 0x0A]);
}

#[tokio::test(start_paused = true)]
async fn test_feed_paper_exact_bytes() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    assert!(session.feed_paper(3).await.unwrap());
    assert_eq!(adapter.written_bytes(), vec![0x0A, 0x0A, 0x0A]);
}

#[tokio::test(start_paused = true)]
async fn test_cut_paper_exact_bytes() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    assert!(session.cut_paper().await.unwrap());
    assert_eq!(adapter.written_bytes(), vec![0x1D, 0x56, 0x00]);
}

#[tokio::test(start_paused = true)]
async fn test_send_raw_unmodified() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let data = vec![0x1B, 0x40, 0xFF, 0x00, 0x10];
    assert!(session.send_raw(data.clone()).await.unwrap());
    assert_eq!(adapter.written_bytes(), data);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_arguments_have_no_side_effects() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;

    assert!(matches!(
        session.feed_paper(0).await,
        Err(PrinterError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.send_raw(Vec::new()).await,
        Err(PrinterError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.print_job("", None, &PrintSettings::default()).await,
        Err(PrinterError::InvalidArgument(_))
    ));
    assert_eq!(adapter.write_calls(), 0);
    assert_eq!(session.printer_status().await, PrinterStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_print_while_disconnected_never_touches_transport() {
    let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
    let session = session(&adapter);
    let settings = PrintSettings::default();

    assert!(matches!(
        session.print_text("Hello", &settings).await,
        Err(PrinterError::NotConnected)
    ));
    assert!(matches!(session.feed_paper(1).await, Err(PrinterError::NotConnected)));
    assert!(matches!(session.cut_paper().await, Err(PrinterError::NotConnected)));
    assert!(matches!(
        session.send_raw(vec![1]).await,
        Err(PrinterError::NotConnected)
    ));
    assert!(matches!(
        session.print_document(vec![], &settings).await,
        Err(PrinterError::NotConnected)
    ));

    assert_eq!(adapter.write_calls(), 0);
    assert!(adapter.gatt_attempts().is_empty());
    assert_eq!(session.printer_status().await, PrinterStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_print_image_raster_block() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let pixels = PixelGrid::filled(16, 8, [0, 0, 0, 255]).unwrap();

    assert!(
        session
            .print_image(pixels, Some(16), None, &PrintSettings::default())
            .await
            .unwrap()
    );

    let mut expected = vec![0x1B, 0x40, 0x1B, 0x61, 0x01];
    expected.extend([0x1D, 0x76, 0x30, 0x00, 0x02, 0x00, 0x08, 0x00]);
    expected.extend([0xFF; 16]);
    expected.extend([0x1B, 0x61, 0x00]);
    assert_eq!(adapter.written_bytes(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_print_image_too_narrow_is_encoding_failure() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let pixels = PixelGrid::filled(16, 8, [0, 0, 0, 255]).unwrap();

    let result = session
        .print_image(pixels, Some(4), None, &PrintSettings::default())
        .await;
    assert!(matches!(result, Err(PrinterError::EncodingFailure(_))));
    assert_eq!(adapter.write_calls(), 0);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_print_job_text_then_image() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let image = ImageItem::new(PixelGrid::filled(8, 2, [255, 255, 255, 255]).unwrap()).width(8);

    assert!(
        session
            .print_job("Order 42", Some(image), &PrintSettings::default())
            .await
            .unwrap()
    );

    let program = Program::decode(&adapter.written_bytes());
    let text_at = program
        .iter()
        .position(|op| *op == Op::Text("Order 42".into()))
        .unwrap();
    let raster_at = program
        .iter()
        .position(|op| matches!(op, Op::Raster { .. }))
        .unwrap();
    assert!(text_at < raster_at);
    assert!(matches!(
        program.iter().nth(raster_at),
        Some(Op::Raster { width_bytes: 1, height: 2, data }) if data == &vec![0x00, 0x00]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_print_document_round_trips() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let items = vec![
        TextRun::new("TOTAL").bold().size(TextSize::ExtraLarge).into(),
        DocumentItem::divider('=', 8),
        DocumentItem::raw(vec![0x1B, 0x70, 0x00]),
        DocumentItem::line_feed(2),
    ];

    assert!(
        session
            .print_document(items, &PrintSettings::default())
            .await
            .unwrap()
    );

    let bytes = adapter.written_bytes();
    let program = Program::decode(&bytes);
    assert_eq!(program.to_bytes(), bytes);
    assert_eq!(program.iter().next(), Some(&Op::Init));
    assert!(program.iter().any(|op| *op == Op::SetCharSize(0x22)));
    assert!(program.iter().any(|op| *op == Op::Text("========".into())));
}

// ============================================================================
// TRANSFER
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_without_response_chunks_and_pacing() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;

    assert!(session.send_raw(vec![0x55; 1024]).await.unwrap());

    assert_eq!(chunk_lengths(&adapter), vec![500, 500, 24]);
    let writes = adapter.writes();
    assert!(writes.iter().all(|w| w.mode == Some(WriteMode::WithoutResponse)));
    assert!(writes[2].at - writes[0].at >= Duration::from_millis(40));
    assert_eq!(adapter.written_bytes(), vec![0x55; 1024]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_pause_after_fifth_chunk() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;

    assert!(session.send_raw(vec![0xAA; 3000]).await.unwrap());

    let writes = adapter.writes();
    assert_eq!(writes.len(), 6);
    assert_eq!(writes[1].at - writes[0].at, Duration::from_millis(20));
    assert_eq!(writes[5].at - writes[4].at, Duration::from_millis(40));
}

#[tokio::test(start_paused = true)]
async fn test_granted_mtu_caps_chunk_size() {
    let (session, adapter) = connected(GattBehavior::printer(Some(185))).await;

    assert!(session.send_raw(vec![1; 400]).await.unwrap());

    assert_eq!(adapter.mtu_requests(), vec![512]);
    assert_eq!(chunk_lengths(&adapter), vec![182, 182, 36]);
}

#[tokio::test(start_paused = true)]
async fn test_with_response_chunks() {
    let (session, adapter) = connected(GattBehavior::printer_with_response(None)).await;

    assert!(session.send_raw(vec![7; 450]).await.unwrap());

    assert_eq!(chunk_lengths(&adapter), vec![200, 200, 50]);
    assert!(
        adapter
            .writes()
            .iter()
            .all(|w| w.mode == Some(WriteMode::WithResponse))
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_ack_fails_transfer() {
    let (session, adapter) = connected(GattBehavior::printer_with_response(None)).await;
    adapter.withhold_acks();

    assert!(!session.send_raw(vec![7; 450]).await.unwrap());
    assert_eq!(session.printer_status().await, PrinterStatus::Error);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_single_failure_is_retried() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    adapter.fail_writes([1]);

    assert!(session.send_raw(vec![3; 1024]).await.unwrap());
    assert_eq!(adapter.write_calls(), 4);
    assert_eq!(adapter.written_bytes(), vec![3; 1024]);

    // 20ms pace before the failed write, then 3 x 20ms before the retry
    let writes = adapter.writes();
    assert!(writes[1].at - writes[0].at >= Duration::from_millis(80));
}

#[tokio::test(start_paused = true)]
async fn test_second_failure_aborts() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    let mut status = session.subscribe_printer_status();
    adapter.fail_writes([1, 2]);

    assert!(!session.send_raw(vec![3; 1024]).await.unwrap());

    assert_eq!(adapter.write_calls(), 3);
    assert_eq!(chunk_lengths(&adapter), vec![500]);
    assert_eq!(drain(&mut status), vec![PrinterStatus::Busy, PrinterStatus::Error]);

    // The link is still usable
    assert!(session.cut_paper().await.unwrap());
    assert_eq!(session.printer_status().await, PrinterStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_mid_transfer() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    adapter.drop_after_writes(1);

    assert!(!session.send_raw(vec![9; 1500]).await.unwrap());

    assert_eq!(adapter.write_calls(), 1);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.printer_status().await, PrinterStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_classic_transfer_single_write() {
    let adapter = MockAdapter::new()
        .with_gatt(GattBehavior::Fail)
        .with_rfcomm(RfcommBehavior::Succeed)
        .with_bonded(vec![Device::paired(BONDED_MAC, "PT-210")]);
    let session = session(&adapter);
    assert!(session.connect(BONDED_MAC).await.unwrap());

    assert!(session.send_raw(vec![0x42; 2048]).await.unwrap());

    let writes = adapter.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].mode, None);
    assert_eq!(writes[0].data.len(), 2048);
}

// ============================================================================
// CONNECTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_ble() {
    let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
    let session = session(&adapter);
    let mut states = session.subscribe_connection_state();
    let mut status = session.subscribe_printer_status();

    assert!(session.connect("printer-1").await.unwrap());

    assert_eq!(
        drain(&mut states),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert_eq!(drain(&mut status), vec![PrinterStatus::Ready]);
    let device = session.connected_device().unwrap();
    assert_eq!(device.kind, DeviceKind::Ble);
    assert!(session.is_connected().await);
    assert!(adapter.rfcomm_attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bonded_device_falls_back_to_classic() {
    let adapter = MockAdapter::new()
        .with_gatt(GattBehavior::Fail)
        .with_rfcomm(RfcommBehavior::Succeed)
        .with_bonded(vec![Device::paired(BONDED_MAC, "PT-210")]);
    let session = session(&adapter);

    assert!(session.connect(BONDED_MAC).await.unwrap());

    assert_eq!(adapter.gatt_attempts(), vec![BONDED_MAC.to_string()]);
    assert_eq!(adapter.rfcomm_attempts(), vec![BONDED_MAC.to_string()]);
    let device = session.connected_device().unwrap();
    assert_eq!(device.kind, DeviceKind::Classic);
    assert_eq!(device.name, "PT-210");
}

#[tokio::test(start_paused = true)]
async fn test_unbonded_device_never_tries_classic() {
    let adapter = MockAdapter::new()
        .with_gatt(GattBehavior::Fail)
        .with_rfcomm(RfcommBehavior::Succeed);
    let session = session(&adapter);
    let mut states = session.subscribe_connection_state();

    assert!(!session.connect(BONDED_MAC).await.unwrap());

    assert!(adapter.rfcomm_attempts().is_empty());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        drain(&mut states),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
    assert!(session.connected_device().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ble_timeout_then_classic() {
    let adapter = MockAdapter::new()
        .with_gatt(GattBehavior::Hang)
        .with_rfcomm(RfcommBehavior::Succeed)
        .with_bonded(vec![Device::paired(BONDED_MAC, "PT-210")]);
    let session = session(&adapter);

    let started = tokio::time::Instant::now();
    assert!(session.connect(BONDED_MAC).await.unwrap());
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(8));
    assert!(elapsed < Duration::from_secs(9));
    assert_eq!(session.connected_device().unwrap().kind, DeviceKind::Classic);
}

#[tokio::test(start_paused = true)]
async fn test_both_transports_time_out() {
    let adapter = MockAdapter::new()
        .with_gatt(GattBehavior::Hang)
        .with_rfcomm(RfcommBehavior::Hang)
        .with_bonded(vec![Device::paired(BONDED_MAC, "PT-210")]);
    let session = session(&adapter);

    let started = tokio::time::Instant::now();
    assert!(!session.connect(BONDED_MAC).await.unwrap());

    assert!(started.elapsed() >= Duration::from_secs(18));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_argument_and_adapter_errors() {
    let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
    let session = session(&adapter);
    assert!(matches!(
        session.connect("").await,
        Err(PrinterError::InvalidArgument(_))
    ));

    let off = MockAdapter::new().with_powered(false);
    let session = PrinterSession::new(Arc::new(off), SessionConfig::default());
    assert!(!session.is_bluetooth_available().await);
    assert!(matches!(
        session.connect("printer-1").await,
        Err(PrinterError::BluetoothUnavailable)
    ));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
    let session = session(&adapter);
    let mut states = session.subscribe_connection_state();

    assert!(session.disconnect().await.unwrap());
    assert!(session.disconnect().await.unwrap());
    assert!(drain(&mut states).is_empty());
    assert_eq!(adapter.closes(), 0);

    assert!(session.connect("printer-1").await.unwrap());
    assert!(session.disconnect().await.unwrap());
    assert!(session.disconnect().await.unwrap());

    assert_eq!(adapter.closes(), 1);
    assert_eq!(
        drain(&mut states),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(session.printer_status().await, PrinterStatus::Offline);
    assert!(session.connected_device().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_transfer() {
    let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
    let session = Arc::new(session(&adapter));
    assert!(session.connect("printer-1").await.unwrap());

    let printing = Arc::clone(&session);
    let job = tokio::spawn(async move { printing.send_raw(vec![0; 5000]).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(session.printer_status().await, PrinterStatus::Busy);
    assert!(session.disconnect().await.unwrap());

    assert!(!job.await.unwrap().unwrap());
    assert!(adapter.write_calls() < 10);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.printer_status().await, PrinterStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_detects_dead_link() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;
    assert!(session.is_connected().await);

    adapter.kill_link();

    assert_eq!(session.printer_status().await, PrinterStatus::Offline);
    assert!(!session.is_connected().await);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(session.cut_paper().await, Err(PrinterError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_connection() {
    let (session, adapter) = connected(GattBehavior::printer(None)).await;

    assert!(session.connect("printer-2").await.unwrap());

    assert_eq!(adapter.closes(), 1);
    assert_eq!(session.connected_device().unwrap().id, "printer-2");
    assert!(session.feed_paper(1).await.unwrap());
}

// ============================================================================
// DISCOVERY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_then_connect_uses_discovered_record() {
    let adapter = MockAdapter::new()
        .with_scan_results(vec![
            MockAdapter::ble_device("p1", "Kitchen Printer", -58),
            MockAdapter::ble_device("p2", "Bar Printer", -71),
        ])
        .with_gatt(GattBehavior::printer(None));
    let session = session(&adapter);
    let mut found = session.subscribe_discovery();

    assert!(session.start_scan().await.unwrap());
    assert_eq!(found.recv().await.unwrap().id, "p1");
    assert_eq!(found.recv().await.unwrap().id, "p2");
    assert!(session.stop_scan().await.unwrap());
    assert!(!adapter.is_scanning());

    let ids: Vec<String> = session.discovered_devices().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["p1", "p2"]);

    assert!(session.connect("p1").await.unwrap());
    let device = session.connected_device().unwrap();
    assert_eq!(device.name, "Kitchen Printer");
    assert_eq!(device.rssi, Some(-58));
}

#[tokio::test(start_paused = true)]
async fn test_paired_devices_are_classic_records() {
    let mut bonded = Device::paired(BONDED_MAC, "PT-210");
    bonded.kind = DeviceKind::Ble;
    bonded.rssi = Some(-40);
    let adapter = MockAdapter::new().with_bonded(vec![bonded]);
    let session = session(&adapter);

    let paired = session.paired_devices().await.unwrap();
    assert_eq!(paired.len(), 1);
    assert_eq!(paired[0].kind, DeviceKind::Classic);
    assert_eq!(paired[0].rssi, None);
    assert!(paired[0].is_paired);
}

#[tokio::test(start_paused = true)]
async fn test_scan_requires_powered_adapter() {
    let session = session(&MockAdapter::new().with_powered(false));
    assert!(matches!(
        session.start_scan().await,
        Err(PrinterError::BluetoothUnavailable)
    ));
    assert!(matches!(
        session.paired_devices().await,
        Err(PrinterError::BluetoothUnavailable)
    ));
}
