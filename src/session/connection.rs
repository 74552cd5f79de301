//! # Connection Manager
//!
//! Owns the single active [`Connection`] and is the only writer of
//! [`ConnectionState`] and [`PrinterStatus`].
//!
//! ## State Machine
//!
//! ```text
//!                 connect()                    BLE ok / Classic ok
//! Disconnected ─────────────► Connecting ─────────────────────────► Connected
//!      ▲                          │                                     │
//!      │   BLE failed and not     │                      disconnect()   │
//!      │   bonded, or both failed │                      dead link      │
//!      ├──────────────────────────┘                                     ▼
//!      └──────────────────────────────────────────────────────── Disconnecting
//! ```
//!
//! ## Connect Order
//!
//! 1. BLE within one 8 s deadline: GATT connect, MTU 512, service discovery,
//!    write characteristic selection. A link that came up but missed the
//!    deadline is disconnected before moving on.
//! 2. Classic RFCOMM within 10 s, only if the device is bonded. Unbonded
//!    devices are never paired implicitly.
//!
//! ## Locking
//!
//! The connection sits behind an async mutex. A transfer takes an owned
//! guard into its worker task and keeps it until the job ends, so only one
//! transfer runs per connection. State and status live in `watch` channels
//! and never wait on that mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionConfig, TransferConfig};
use crate::error::{PrinterError, TransferError, TransportError};
use crate::printer::{ConnectionState, PrinterStatus};
use crate::transfer::{self, Cancellation};
use crate::transport::{
    BleConnection, BluetoothAdapter, ClassicConnection, Connection, Device, DeviceKind,
    GattCharacteristic, GattClient, GattLink, WriteMode, select_write_characteristic,
};

/// Capacity of the state and status event channels.
const EVENT_CAPACITY: usize = 32;

/// Upper bound on closing a half-configured GATT link.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ConnectionManager {
    adapter: Arc<dyn BluetoothAdapter>,
    connection_config: ConnectionConfig,
    transfer_config: TransferConfig,

    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
    /// Serializes connect and disconnect
    lifecycle: tokio::sync::Mutex<()>,
    device: Mutex<Option<Device>>,

    state: watch::Sender<ConnectionState>,
    status: watch::Sender<PrinterStatus>,
    state_events: broadcast::Sender<ConnectionState>,
    status_events: broadcast::Sender<PrinterStatus>,

    /// Bumped by `disconnect()`; in-flight transfers watch it
    cancel: watch::Sender<u64>,
}

impl ConnectionManager {
    pub fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        connection_config: ConnectionConfig,
        transfer_config: TransferConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (status, _) = watch::channel(PrinterStatus::Offline);
        let (state_events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_events, _) = broadcast::channel(EVENT_CAPACITY);
        let (cancel, _) = watch::channel(0);

        Self {
            adapter,
            connection_config,
            transfer_config,
            connection: Arc::new(tokio::sync::Mutex::new(None)),
            lifecycle: tokio::sync::Mutex::new(()),
            device: Mutex::new(None),
            state,
            status,
            state_events,
            status_events,
            cancel,
        }
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn status(&self) -> PrinterStatus {
        *self.status.borrow()
    }

    pub fn connected_device(&self) -> Option<Device> {
        self.device_slot().clone()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_events.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<PrinterStatus> {
        self.status_events.subscribe()
    }

    fn device_slot(&self) -> MutexGuard<'_, Option<Device>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state");
            let _ = self.state_events.send(next);
        }
    }

    /// Publish a printer status. Anything but `Offline` is dropped unless
    /// the state is `Connected`.
    fn set_status(&self, next: PrinterStatus) {
        if next != PrinterStatus::Offline && self.state() != ConnectionState::Connected {
            debug!(status = %next, state = %self.state(), "Ignoring status while not connected");
            return;
        }
        let previous = self.status.send_replace(next);
        if previous != next {
            let _ = self.status_events.send(next);
        }
    }

    fn mark_disconnected(&self) {
        *self.device_slot() = None;
        self.set_state(ConnectionState::Disconnected);
        self.set_status(PrinterStatus::Offline);
    }

    // ========================================================================
    // CONNECT
    // ========================================================================

    /// Connect to `device_id`. `discovered` is the registry record, if any.
    ///
    /// Returns `Ok(false)` when both transports fail; the reasons are logged.
    pub async fn connect(
        &self,
        device_id: &str,
        discovered: Option<Device>,
    ) -> Result<bool, PrinterError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(PrinterError::InvalidArgument("Device id is required".into()));
        }
        if !self.adapter.is_powered().await {
            return Err(PrinterError::BluetoothUnavailable);
        }

        let _lifecycle = self.lifecycle.lock().await;
        if self.state() != ConnectionState::Disconnected {
            info!("Replacing existing connection");
            self.teardown().await;
        }

        self.set_state(ConnectionState::Connecting);

        let bonded = match self.adapter.bonded_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Could not read bonded devices");
                Vec::new()
            }
        };
        let is_target = |d: &Device| d.id == device_id || d.address.eq_ignore_ascii_case(device_id);

        let mut device = discovered
            .or_else(|| bonded.iter().find(|d| is_target(d)).cloned())
            .unwrap_or_else(|| Device {
                id: device_id.to_string(),
                name: device_id.to_string(),
                address: device_id.to_string(),
                kind: DeviceKind::Ble,
                rssi: None,
                is_paired: false,
            });
        let is_bonded = device.is_paired
            || bonded
                .iter()
                .any(|d| is_target(d) || d.address.eq_ignore_ascii_case(&device.address));

        info!(id = %device.id, address = %device.address, is_bonded, "Connecting");

        let connection = match self.connect_ble(&device.address).await {
            Some(connection) => Some(connection),
            None if is_bonded => self.connect_classic(&device.address).await,
            None => {
                info!(id = %device.id, "Device not bonded, skipping Classic fallback");
                None
            }
        };

        match connection {
            Some(connection) => {
                device.kind = connection.kind();
                device.is_paired = is_bonded;
                info!(id = %device.id, kind = ?device.kind, "Connected");

                *self.connection.lock().await = Some(connection);
                *self.device_slot() = Some(device);
                self.set_state(ConnectionState::Connected);
                self.set_status(PrinterStatus::Ready);
                Ok(true)
            }
            None => {
                let err = PrinterError::ConnectionFailed(if is_bonded {
                    format!("{} unreachable over BLE and Classic", device.address)
                } else {
                    format!("{} unreachable over BLE", device.address)
                });
                warn!(id = %device.id, error = %err, "All connection attempts failed");
                self.mark_disconnected();
                Ok(false)
            }
        }
    }

    /// One BLE attempt under a single deadline. The deadline covers the
    /// GATT connect and everything after it; a link that is up when the
    /// deadline passes is closed before giving up.
    async fn connect_ble(&self, address: &str) -> Option<Connection> {
        let budget = self.connection_config.ble_timeout();
        let deadline = Instant::now() + budget;

        let GattLink { mut client, events } =
            match timeout_at(deadline, self.adapter.connect_gatt(address)).await {
                Ok(Ok(link)) => link,
                Ok(Err(e)) => {
                    warn!(address, error = %e, "BLE connection failed");
                    return None;
                }
                Err(_) => {
                    warn!(address, deadline = ?budget, "BLE connection timed out");
                    return None;
                }
            };

        let configured = timeout_at(deadline, self.configure_ble(client.as_mut())).await;
        let failure = match configured {
            Ok(Ok((characteristic, write_mode, mtu))) => {
                debug!(uuid = %characteristic.uuid, ?write_mode, "Selected write characteristic");
                return Some(Connection::Ble(BleConnection {
                    client,
                    events,
                    characteristic,
                    write_mode,
                    mtu,
                }));
            }
            Ok(Err(e)) => e,
            Err(_) => TransportError::Timeout(budget),
        };

        warn!(address, error = %failure, "BLE setup failed, closing link");
        match timeout(CLOSE_TIMEOUT, client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "GATT disconnect failed"),
            Err(_) => warn!(address, "GATT disconnect did not complete"),
        }
        None
    }

    /// MTU exchange, service discovery and write characteristic selection
    /// on a freshly connected client.
    async fn configure_ble(
        &self,
        client: &mut dyn GattClient,
    ) -> Result<(GattCharacteristic, WriteMode, Option<u16>), TransportError> {
        let mtu = match client.request_mtu(self.connection_config.requested_mtu).await {
            Ok(mtu) => {
                debug!(mtu, "MTU granted");
                Some(mtu)
            }
            Err(e) => {
                debug!(error = %e, "MTU request failed, size unknown");
                None
            }
        };

        let services = client.discover_services().await?;
        let characteristic = select_write_characteristic(&services)
            .ok_or_else(|| TransportError::Gatt("No writable characteristic found".into()))?;
        let write_mode = characteristic
            .write_mode()
            .ok_or_else(|| TransportError::Gatt("Characteristic is not writable".into()))?;
        Ok((characteristic, write_mode, mtu))
    }

    async fn connect_classic(&self, address: &str) -> Option<Connection> {
        warn!(address, "Falling back to Bluetooth Classic");
        let deadline = self.connection_config.classic_timeout();
        match timeout(deadline, self.adapter.connect_rfcomm(address)).await {
            Ok(Ok(stream)) => Some(Connection::Classic(ClassicConnection { stream })),
            Ok(Err(e)) => {
                warn!(address, error = %e, "Classic connection failed");
                None
            }
            Err(_) => {
                warn!(address, ?deadline, "Classic connection timed out");
                None
            }
        }
    }

    // ========================================================================
    // DISCONNECT
    // ========================================================================

    /// Close the connection. Already disconnected is success.
    pub async fn disconnect(&self) -> Result<bool, PrinterError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state() == ConnectionState::Disconnected {
            return Ok(true);
        }
        self.teardown().await;
        info!("Disconnected");
        Ok(true)
    }

    /// Cancel any transfer, close the link and publish `Disconnected`.
    async fn teardown(&self) {
        self.set_state(ConnectionState::Disconnecting);
        self.cancel.send_modify(|generation| *generation += 1);

        if let Some(mut connection) = self.connection.lock().await.take() {
            // close() logs its own failures
            let _ = connection.close().await;
        }
        self.mark_disconnected();
    }

    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Passive liveness check. Skipped while a transfer holds the link.
    ///
    /// Returns whether the session is (still) connected.
    pub async fn check_health(&self) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let Ok(_lifecycle) = self.lifecycle.try_lock() else {
            return self.state() == ConnectionState::Connected;
        };
        let Ok(mut slot) = self.connection.try_lock() else {
            return true;
        };

        let alive = match slot.as_mut() {
            Some(connection) => connection.is_alive().await,
            None => false,
        };
        if alive {
            return true;
        }

        warn!("Health check failed, dropping connection");
        if let Some(mut connection) = slot.take() {
            let _ = connection.close().await;
        }
        drop(slot);
        self.mark_disconnected();
        false
    }

    // ========================================================================
    // SEND
    // ========================================================================

    /// Fail with `NotConnected` unless the state is `Connected`.
    pub fn ensure_connected(&self) -> Result<(), PrinterError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(PrinterError::NotConnected)
        }
    }

    /// Transfer `payload` on a worker task.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the transfer
    /// failed (status becomes `Error`).
    pub async fn send(&self, payload: Vec<u8>) -> Result<bool, PrinterError> {
        self.ensure_connected()?;
        self.set_status(PrinterStatus::Busy);

        let cancel = Cancellation::new(self.cancel.subscribe());
        let guard = Arc::clone(&self.connection).lock_owned().await;
        if guard.is_none() {
            return Err(PrinterError::NotConnected);
        }

        let config = self.transfer_config;
        let worker = tokio::spawn(async move {
            let mut guard = guard;
            match guard.as_mut() {
                Some(connection) => transfer::run(connection, payload, &config, cancel).await,
                None => Err(TransferError::Disconnected),
            }
        });

        match worker.await {
            Ok(Ok(_report)) => {
                self.set_status(PrinterStatus::Ready);
                Ok(true)
            }
            Ok(Err(e)) => {
                let link_lost = matches!(e, TransferError::Disconnected);
                let err = PrinterError::from(e);
                warn!(error = %err, "Print job failed");
                self.set_status(PrinterStatus::Error);
                if link_lost {
                    self.check_health().await;
                }
                Ok(false)
            }
            Err(join) => {
                error!(error = %join, "Transfer worker panicked");
                self.set_status(PrinterStatus::Error);
                Ok(false)
            }
        }
    }
}
