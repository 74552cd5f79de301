//! # Scripted Mock Adapter
//!
//! An in-memory [`BluetoothAdapter`] whose behaviour is set up front and
//! whose traffic is recorded for inspection. Used by the integration tests
//! and handy for exercising a session without hardware.
//!
//! ```
//! use silver_printer::transport::mock::{GattBehavior, MockAdapter};
//!
//! let adapter = MockAdapter::new()
//!     .with_scan_results(vec![MockAdapter::ble_device("p1", "Printer", -60)])
//!     .with_gatt(GattBehavior::printer(None));
//!
//! // Keep a clone to inspect writes after handing the adapter to a session.
//! let probe = adapter.clone();
//! assert!(probe.writes().is_empty());
//! ```
//!
//! Timestamps use `tokio::time::Instant`, so tests running with a paused
//! clock can assert on pacing exactly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    BluetoothAdapter, Device, DeviceKind, GattCharacteristic, GattClient, GattEvent, GattLink,
    GattService, RfcommStream, WriteMode,
};
use crate::error::TransportError;

/// Service UUID advertised by the default mock printer profile.
pub const PRINTER_SERVICE: Uuid = Uuid::from_u128(0x0000_18f0_0000_1000_8000_0080_5f9b_34fb);

/// Write characteristic of the default mock printer profile.
pub const PRINTER_WRITE_CHAR: Uuid = Uuid::from_u128(0x0000_2af1_0000_1000_8000_0080_5f9b_34fb);

// ============================================================================
// SCRIPT
// ============================================================================

/// What `connect_gatt` does.
#[derive(Debug, Clone)]
pub enum GattBehavior {
    /// Link comes up with these services. `mtu: None` makes MTU requests fail.
    Succeed {
        services: Vec<GattService>,
        mtu: Option<u16>,
    },
    /// Connection attempt is rejected.
    Fail,
    /// Connection attempt never completes.
    Hang,
    /// Link comes up but service discovery never completes.
    StallDiscovery { mtu: Option<u16> },
}

impl GattBehavior {
    /// A single-service printer with one write-without-response characteristic.
    pub fn printer(mtu: Option<u16>) -> Self {
        Self::printer_with_modes(true, true, mtu)
    }

    /// A printer whose characteristic only supports acknowledged writes.
    pub fn printer_with_response(mtu: Option<u16>) -> Self {
        Self::printer_with_modes(true, false, mtu)
    }

    fn printer_with_modes(write: bool, without_response: bool, mtu: Option<u16>) -> Self {
        GattBehavior::Succeed {
            services: vec![GattService {
                uuid: PRINTER_SERVICE,
                characteristics: vec![GattCharacteristic {
                    uuid: PRINTER_WRITE_CHAR,
                    service_uuid: PRINTER_SERVICE,
                    write,
                    write_without_response: without_response,
                }],
            }],
            mtu,
        }
    }
}

/// What `connect_rfcomm` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfcommBehavior {
    Succeed,
    Fail,
    Hang,
}

/// One write seen by the mock, BLE or Classic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub data: Vec<u8>,
    /// `None` for Classic stream writes
    pub mode: Option<WriteMode>,
    pub at: Instant,
}

#[derive(Debug)]
struct MockState {
    powered: bool,
    scan_results: Vec<Device>,
    bonded: Vec<Device>,
    gatt: GattBehavior,
    rfcomm: RfcommBehavior,

    /// Zero-based write-call indices that fail
    failing_writes: HashSet<usize>,
    /// Link drops after this many write calls
    drop_after_writes: Option<usize>,
    /// With-response writes are never acknowledged
    withhold_acks: bool,
    /// Per write-call ack override: `None` never acks, `Some(d)` acks after `d`
    ack_overrides: HashMap<usize, Option<Duration>>,

    alive: bool,
    scanning: bool,
    write_calls: usize,
    writes: Vec<RecordedWrite>,
    gatt_attempts: Vec<String>,
    rfcomm_attempts: Vec<String>,
    mtu_requests: Vec<u16>,
    closes: usize,
    event_tx: Option<mpsc::UnboundedSender<GattEvent>>,
    /// Held while scanning; dropping it ends the scan stream
    scan_tx: Option<mpsc::UnboundedSender<Device>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            powered: true,
            scan_results: Vec::new(),
            bonded: Vec::new(),
            gatt: GattBehavior::Fail,
            rfcomm: RfcommBehavior::Fail,
            failing_writes: HashSet::new(),
            drop_after_writes: None,
            withhold_acks: false,
            ack_overrides: HashMap::new(),
            alive: false,
            scanning: false,
            write_calls: 0,
            writes: Vec::new(),
            gatt_attempts: Vec::new(),
            rfcomm_attempts: Vec::new(),
            mtu_requests: Vec::new(),
            closes: 0,
            event_tx: None,
            scan_tx: None,
        }
    }
}

impl MockState {
    /// Record a write and decide its outcome.
    fn write(&mut self, data: &[u8], mode: Option<WriteMode>) -> Result<(), TransportError> {
        if !self.alive {
            return Err(TransportError::Disconnected);
        }

        let index = self.write_calls;
        self.write_calls += 1;

        if self.failing_writes.contains(&index) {
            return Err(TransportError::Gatt(format!("injected failure on write {}", index)));
        }

        self.writes.push(RecordedWrite {
            data: data.to_vec(),
            mode,
            at: Instant::now(),
        });

        if mode == Some(WriteMode::WithResponse) && !self.withhold_acks {
            match self.ack_overrides.get(&index) {
                None => self.send_event(GattEvent::WriteCompleted { success: true }),
                Some(None) => {}
                Some(Some(delay)) => {
                    if let Some(tx) = self.event_tx.clone() {
                        let delay = *delay;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(GattEvent::WriteCompleted { success: true });
                        });
                    }
                }
            }
        }

        if self.drop_after_writes == Some(self.write_calls) {
            self.alive = false;
            self.send_event(GattEvent::Disconnected);
        }
        Ok(())
    }

    fn send_event(&self, event: GattEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Scripted adapter. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A BLE advertisement record.
    pub fn ble_device(id: &str, name: &str, rssi: i16) -> Device {
        Device {
            id: id.to_string(),
            name: name.to_string(),
            address: id.to_string(),
            kind: DeviceKind::Ble,
            rssi: Some(rssi),
            is_paired: false,
        }
    }

    // ===== Script =====

    pub fn with_powered(self, powered: bool) -> Self {
        self.state().powered = powered;
        self
    }

    pub fn with_scan_results(self, devices: Vec<Device>) -> Self {
        self.state().scan_results = devices;
        self
    }

    pub fn with_bonded(self, devices: Vec<Device>) -> Self {
        self.state().bonded = devices;
        self
    }

    pub fn with_gatt(self, behavior: GattBehavior) -> Self {
        self.state().gatt = behavior;
        self
    }

    pub fn with_rfcomm(self, behavior: RfcommBehavior) -> Self {
        self.state().rfcomm = behavior;
        self
    }

    /// Make the given zero-based write calls fail.
    pub fn fail_writes(&self, indices: impl IntoIterator<Item = usize>) {
        self.state().failing_writes.extend(indices);
    }

    /// Drop the link (and emit `GattEvent::Disconnected`) after `n` writes.
    pub fn drop_after_writes(&self, n: usize) {
        self.state().drop_after_writes = Some(n);
    }

    pub fn withhold_acks(&self) {
        self.state().withhold_acks = true;
    }

    /// Acknowledge the given zero-based write call only after `delay`.
    pub fn delay_ack(&self, index: usize, delay: Duration) {
        self.state().ack_overrides.insert(index, Some(delay));
    }

    /// Never acknowledge the given zero-based write call.
    pub fn withhold_ack(&self, index: usize) {
        self.state().ack_overrides.insert(index, None);
    }

    /// End the scan stream from the adapter side, as if the stack gave up.
    pub fn end_scan(&self) {
        let mut state = self.state();
        state.scanning = false;
        state.scan_tx = None;
    }

    /// Simulate the printer going away without an event.
    pub fn kill_link(&self) {
        self.state().alive = false;
    }

    // ===== Inspection =====

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    /// All written bytes, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state()
            .writes
            .iter()
            .flat_map(|w| w.data.iter().copied())
            .collect()
    }

    pub fn write_calls(&self) -> usize {
        self.state().write_calls
    }

    pub fn gatt_attempts(&self) -> Vec<String> {
        self.state().gatt_attempts.clone()
    }

    pub fn rfcomm_attempts(&self) -> Vec<String> {
        self.state().rfcomm_attempts.clone()
    }

    pub fn mtu_requests(&self) -> Vec<u16> {
        self.state().mtu_requests.clone()
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scanning
    }
}

#[async_trait]
impl BluetoothAdapter for MockAdapter {
    async fn is_powered(&self) -> bool {
        self.state().powered
    }

    async fn start_scan(&self, found: mpsc::UnboundedSender<Device>) -> Result<(), TransportError> {
        let mut state = self.state();
        for device in &state.scan_results {
            let _ = found.send(device.clone());
        }
        state.scanning = true;
        state.scan_tx = Some(found);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.scanning = false;
        state.scan_tx = None;
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>, TransportError> {
        Ok(self.state().bonded.clone())
    }

    async fn connect_gatt(&self, address: &str) -> Result<GattLink, TransportError> {
        let behavior = {
            let mut state = self.state();
            state.gatt_attempts.push(address.to_string());
            state.gatt.clone()
        };

        let (services, mtu, stall_discovery) = match behavior {
            GattBehavior::Succeed { services, mtu } => (services, mtu, false),
            GattBehavior::StallDiscovery { mtu } => (Vec::new(), mtu, true),
            GattBehavior::Fail => {
                return Err(TransportError::Gatt(format!(
                    "mock refused GATT connection to {}",
                    address
                )));
            }
            GattBehavior::Hang => std::future::pending().await,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state();
            state.alive = true;
            state.event_tx = Some(tx);
        }
        Ok(GattLink {
            client: Box::new(MockGattClient {
                adapter: self.clone(),
                services,
                mtu,
                stall_discovery,
            }),
            events: rx,
        })
    }

    async fn connect_rfcomm(&self, address: &str) -> Result<Box<dyn RfcommStream>, TransportError> {
        let behavior = {
            let mut state = self.state();
            state.rfcomm_attempts.push(address.to_string());
            state.rfcomm
        };

        match behavior {
            RfcommBehavior::Succeed => {
                self.state().alive = true;
                Ok(Box::new(MockRfcommStream {
                    adapter: self.clone(),
                }))
            }
            RfcommBehavior::Fail => Err(TransportError::Rfcomm(format!(
                "mock refused RFCOMM connection to {}",
                address
            ))),
            RfcommBehavior::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// LINKS
// ============================================================================

struct MockGattClient {
    adapter: MockAdapter,
    services: Vec<GattService>,
    mtu: Option<u16>,
    stall_discovery: bool,
}

#[async_trait]
impl GattClient for MockGattClient {
    async fn request_mtu(&mut self, mtu: u16) -> Result<u16, TransportError> {
        self.adapter.state().mtu_requests.push(mtu);
        match self.mtu {
            Some(granted) => Ok(granted.min(mtu)),
            None => Err(TransportError::Unsupported("mock has no MTU exchange".into())),
        }
    }

    async fn discover_services(&mut self) -> Result<Vec<GattService>, TransportError> {
        if self.stall_discovery {
            std::future::pending::<()>().await;
        }
        Ok(self.services.clone())
    }

    async fn write(
        &mut self,
        _characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        self.adapter.state().write(data, Some(mode))
    }

    async fn is_connected(&mut self) -> bool {
        self.adapter.state().alive
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.adapter.state();
        state.alive = false;
        state.closes += 1;
        state.event_tx = None;
        Ok(())
    }
}

struct MockRfcommStream {
    adapter: MockAdapter,
}

#[async_trait]
impl RfcommStream for MockRfcommStream {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.adapter.state().write(data, None)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.adapter.state().alive {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    async fn is_connected(&mut self) -> bool {
        self.adapter.state().alive
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.adapter.state();
        state.alive = false;
        state.closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_replays_results() {
        let adapter = MockAdapter::new()
            .with_scan_results(vec![MockAdapter::ble_device("a", "A", -40)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.start_scan(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert!(adapter.is_scanning());
    }

    #[tokio::test]
    async fn test_with_response_write_is_acked() {
        let adapter = MockAdapter::new().with_gatt(GattBehavior::printer_with_response(Some(185)));
        let mut link = adapter.connect_gatt("p").await.unwrap();
        assert_eq!(link.client.request_mtu(512).await.unwrap(), 185);

        let services = link.client.discover_services().await.unwrap();
        let characteristic = services[0].characteristics[0].clone();
        link.client
            .write(&characteristic, b"abc", WriteMode::WithResponse)
            .await
            .unwrap();

        assert_eq!(
            link.events.recv().await,
            Some(GattEvent::WriteCompleted { success: true })
        );
        assert_eq!(adapter.written_bytes(), b"abc".to_vec());
    }

    #[tokio::test]
    async fn test_injected_failure_not_recorded() {
        let adapter = MockAdapter::new().with_rfcomm(RfcommBehavior::Succeed);
        adapter.fail_writes([0]);
        let mut stream = adapter.connect_rfcomm("p").await.unwrap();
        assert!(stream.write_all(b"x").await.is_err());
        stream.write_all(b"y").await.unwrap();
        assert_eq!(adapter.write_calls(), 2);
        assert_eq!(adapter.written_bytes(), b"y".to_vec());
    }

    #[tokio::test]
    async fn test_drop_after_writes_emits_disconnect() {
        let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
        adapter.drop_after_writes(1);
        let mut link = adapter.connect_gatt("p").await.unwrap();
        let services = link.client.discover_services().await.unwrap();
        let characteristic = services[0].characteristics[0].clone();

        link.client
            .write(&characteristic, b"a", WriteMode::WithoutResponse)
            .await
            .unwrap();
        assert_eq!(link.events.recv().await, Some(GattEvent::Disconnected));
        assert!(!link.client.is_connected().await);
    }
}
