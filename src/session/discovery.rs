//! # Device Discovery
//!
//! One scan at a time. Records from the adapter are de-duplicated by id in a
//! [`DeviceRegistry`]; subscribers hear about a device when it is first seen
//! and again whenever its RSSI moves by at least the configured threshold.
//!
//! ```text
//! adapter ──mpsc<Device>──► consumer task ──► registry (upsert)
//!                                      └──► broadcast<Device> (new / RSSI moved)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::{BluetoothAdapter, Device};

/// Capacity of the discovery event channel.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// REGISTRY
// ============================================================================

/// Discovered devices keyed by id, in first-seen order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Returns whether subscribers should hear
    /// about it: always for a new id, otherwise only when the RSSI moved by
    /// at least `rssi_threshold` dBm.
    pub fn upsert(&mut self, device: Device, rssi_threshold: i16) -> bool {
        match self.index.get(&device.id) {
            Some(&i) => {
                let announce = match (self.devices[i].rssi, device.rssi) {
                    (Some(old), Some(new)) => (new - old).abs() >= rssi_threshold,
                    (None, Some(_)) => true,
                    _ => false,
                };
                self.devices[i] = device;
                announce
            }
            None => {
                self.index.insert(device.id.clone(), self.devices.len());
                self.devices.push(device);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    /// Look a device up by id, then by address.
    pub fn find(&self, id_or_address: &str) -> Option<&Device> {
        self.get(id_or_address).or_else(|| {
            self.devices
                .iter()
                .find(|d| d.address.eq_ignore_ascii_case(id_or_address))
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }
}

// ============================================================================
// SCANNER
// ============================================================================

/// Scan lifecycle plus the registry it fills.
pub struct Discovery {
    adapter: Arc<dyn BluetoothAdapter>,
    registry: Arc<Mutex<DeviceRegistry>>,
    events: broadcast::Sender<Device>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    rssi_threshold: i16,
}

fn lock(registry: &Mutex<DeviceRegistry>) -> MutexGuard<'_, DeviceRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_running(consumer: &Option<JoinHandle<()>>) -> bool {
    consumer.as_ref().is_some_and(|task| !task.is_finished())
}

impl Discovery {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, rssi_threshold: i16) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            adapter,
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            events,
            consumer: tokio::sync::Mutex::new(None),
            rssi_threshold,
        }
    }

    /// Start scanning. Clears earlier results; a no-op while already scanning.
    pub async fn start(&self) -> Result<(), TransportError> {
        let mut consumer = self.consumer.lock().await;
        if is_running(&consumer) {
            debug!("Scan already running");
            return Ok(());
        }
        if consumer.take().is_some() {
            debug!("Previous scan ended on its own");
        }

        lock(&self.registry).clear();

        let (tx, mut rx) = mpsc::unbounded_channel::<Device>();
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        let threshold = self.rssi_threshold;
        let task = tokio::spawn(async move {
            while let Some(device) = rx.recv().await {
                let announce = lock(&registry).upsert(device.clone(), threshold);
                if announce {
                    debug!(id = %device.id, name = %device.name, rssi = ?device.rssi, "Device discovered");
                    let _ = events.send(device);
                }
            }
        });

        if let Err(e) = self.adapter.start_scan(tx).await {
            task.abort();
            return Err(e);
        }

        *consumer = Some(task);
        info!("Scan started");
        Ok(())
    }

    /// Stop scanning. Results stay available.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let mut consumer = self.consumer.lock().await;
        let result = self.adapter.stop_scan().await;
        if let Some(task) = consumer.take() {
            task.abort();
            info!("Scan stopped");
        }
        result
    }

    /// Whether a scan is running. A scan whose adapter stream ended counts
    /// as stopped.
    pub async fn is_scanning(&self) -> bool {
        is_running(&*self.consumer.lock().await)
    }

    pub fn devices(&self) -> Vec<Device> {
        lock(&self.registry).devices().to_vec()
    }

    pub fn lookup(&self, id_or_address: &str) -> Option<Device> {
        lock(&self.registry).find(id_or_address).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Device> {
        self.events.subscribe()
    }
}
