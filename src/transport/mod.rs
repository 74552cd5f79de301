//! # Printer Transport Layer
//!
//! Backends that move bytes to a printer, and the [`Connection`] value that
//! represents one open link.
//!
//! ## Available Transports
//!
//! | Module | Link | Notes |
//! |--------|------|-------|
//! | [`rfcomm`] | Bluetooth Classic (SPP) via `/dev/rfcommN` | Linux, paired devices only |
//! | [`btle`] | Bluetooth LE GATT via btleplug | feature `ble` |
//! | [`mock`] | scripted in-memory adapter | tests and demos |
//!
//! ## Seams
//!
//! ```text
//!                   BluetoothAdapter
//!          ┌──────────────┼───────────────┐
//!     start_scan     connect_gatt     connect_rfcomm
//!          │              │               │
//!    mpsc<Device>    GattLink         Box<dyn RfcommStream>
//!                    ├ Box<dyn GattClient>
//!                    └ mpsc<GattEvent>
//! ```
//!
//! A backend turns platform callbacks into [`GattEvent`] messages on the
//! link's channel. The transfer engine waits on that channel for write
//! acknowledgements and link loss.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TransportError;

#[cfg(feature = "ble")]
pub mod btle;
pub mod mock;
pub mod rfcomm;

// ============================================================================
// DEVICES
// ============================================================================

/// Which radio a device was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Ble,
    Classic,
}

/// A discovered or bonded device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier; the registry key
    pub id: String,
    pub name: String,
    /// MAC address (or platform identifier) used to connect
    pub address: String,
    pub kind: DeviceKind,
    /// Signal strength in dBm, absent for bonded-only records
    pub rssi: Option<i16>,
    pub is_paired: bool,
}

impl Device {
    /// A bonded Classic device as reported by the system pairing list.
    pub fn paired(address: impl Into<String>, name: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            name: name.into(),
            address,
            kind: DeviceKind::Classic,
            rssi: None,
            is_paired: true,
        }
    }
}

// ============================================================================
// GATT
// ============================================================================

/// How a characteristic write is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// ATT Write Request; the peer confirms each write
    WithResponse,
    /// ATT Write Command; fire and forget
    WithoutResponse,
}

/// A characteristic and the write properties it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub write: bool,
    pub write_without_response: bool,
}

impl GattCharacteristic {
    /// Preferred write mode: without-response when available.
    pub fn write_mode(&self) -> Option<WriteMode> {
        if self.write_without_response {
            Some(WriteMode::WithoutResponse)
        } else if self.write {
            Some(WriteMode::WithResponse)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Asynchronous notifications from a GATT link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattEvent {
    /// A with-response write was confirmed (or rejected) by the peer.
    WriteCompleted { success: bool },
    /// The negotiated MTU changed.
    MtuChanged(u16),
    /// The link dropped.
    Disconnected,
}

/// Pick the characteristic print data is written to.
///
/// The first write-without-response characteristic across all services wins;
/// failing that, the first characteristic with plain write.
pub fn select_write_characteristic(services: &[GattService]) -> Option<GattCharacteristic> {
    let all = || services.iter().flat_map(|s| s.characteristics.iter());
    all()
        .find(|c| c.write_without_response)
        .or_else(|| all().find(|c| c.write))
        .cloned()
}

#[async_trait]
pub trait GattClient: Send {
    /// Ask for `mtu`; returns what the peer granted.
    async fn request_mtu(&mut self, mtu: u16) -> Result<u16, TransportError>;

    async fn discover_services(&mut self) -> Result<Vec<GattService>, TransportError>;

    async fn write(
        &mut self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Cheap liveness probe (service cache still readable).
    async fn is_connected(&mut self) -> bool;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// An established GATT link and its event stream.
pub struct GattLink {
    pub client: Box<dyn GattClient>,
    pub events: mpsc::UnboundedReceiver<GattEvent>,
}

// ============================================================================
// RFCOMM
// ============================================================================

#[async_trait]
pub trait RfcommStream: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    async fn is_connected(&mut self) -> bool;

    async fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// ADAPTER
// ============================================================================

/// A Bluetooth stack: discovery, pairing list and link establishment.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether an adapter is present and powered on.
    async fn is_powered(&self) -> bool;

    /// Start discovery. Found devices are sent on `found` until
    /// [`BluetoothAdapter::stop_scan`] is called.
    async fn start_scan(&self, found: mpsc::UnboundedSender<Device>) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Devices bonded with this host.
    async fn bonded_devices(&self) -> Result<Vec<Device>, TransportError>;

    async fn connect_gatt(&self, address: &str) -> Result<GattLink, TransportError>;

    async fn connect_rfcomm(&self, address: &str) -> Result<Box<dyn RfcommStream>, TransportError>;
}

// ============================================================================
// CONNECTION
// ============================================================================

/// An open BLE link with its selected write characteristic.
pub struct BleConnection {
    pub client: Box<dyn GattClient>,
    pub events: mpsc::UnboundedReceiver<GattEvent>,
    pub characteristic: GattCharacteristic,
    pub write_mode: WriteMode,
    /// Negotiated MTU; `None` when the stack would not say
    pub mtu: Option<u16>,
}

impl BleConnection {
    /// Write one chunk with the characteristic's preferred mode.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.client
            .write(&self.characteristic, data, self.write_mode)
            .await
    }

    /// Drop queued events left over from earlier writes.
    ///
    /// Returns how many write acknowledgements were dropped, or
    /// `Err(Disconnected)` if a link-loss event was among them.
    pub fn drain_stale_events(&mut self) -> Result<usize, TransportError> {
        let mut acks = 0;
        while let Ok(event) = self.events.try_recv() {
            match event {
                GattEvent::Disconnected => return Err(TransportError::Disconnected),
                GattEvent::MtuChanged(mtu) => {
                    debug!(mtu, "MTU changed");
                    self.mtu = Some(mtu);
                }
                GattEvent::WriteCompleted { .. } => acks += 1,
            }
        }
        Ok(acks)
    }
}

/// An open Classic (SPP) link.
pub struct ClassicConnection {
    pub stream: Box<dyn RfcommStream>,
}

/// The single active printer link.
pub enum Connection {
    Ble(BleConnection),
    Classic(ClassicConnection),
}

impl Connection {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Connection::Ble(_) => DeviceKind::Ble,
            Connection::Classic(_) => DeviceKind::Classic,
        }
    }

    /// Write `data` as one unit: a single characteristic write on BLE,
    /// write + flush on Classic.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            Connection::Ble(ble) => ble.write_chunk(data).await,
            Connection::Classic(classic) => {
                classic.stream.write_all(data).await?;
                classic.stream.flush().await
            }
        }
    }

    /// Passive liveness probe. Never writes to the printer.
    pub async fn is_alive(&mut self) -> bool {
        match self {
            Connection::Ble(ble) => {
                if ble.drain_stale_events().is_err() {
                    return false;
                }
                ble.client.is_connected().await
            }
            Connection::Classic(classic) => classic.stream.is_connected().await,
        }
    }

    /// Tear the link down.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let result = match self {
            Connection::Ble(ble) => ble.client.disconnect().await,
            Connection::Classic(classic) => classic.stream.close().await,
        };
        if let Err(e) = &result {
            warn!(error = %e, kind = ?self.kind(), "Error while closing connection");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(n: u128, write: bool, without: bool) -> GattCharacteristic {
        GattCharacteristic {
            uuid: Uuid::from_u128(n),
            service_uuid: Uuid::from_u128(0xFF00),
            write,
            write_without_response: without,
        }
    }

    #[test]
    fn test_without_response_preferred_across_services() {
        let services = vec![
            GattService {
                uuid: Uuid::from_u128(1),
                characteristics: vec![characteristic(10, false, false), characteristic(11, true, false)],
            },
            GattService {
                uuid: Uuid::from_u128(2),
                characteristics: vec![characteristic(20, true, true)],
            },
        ];
        let selected = select_write_characteristic(&services).unwrap();
        assert_eq!(selected.uuid, Uuid::from_u128(20));
        assert_eq!(selected.write_mode(), Some(WriteMode::WithoutResponse));
    }

    #[test]
    fn test_falls_back_to_plain_write() {
        let services = vec![GattService {
            uuid: Uuid::from_u128(1),
            characteristics: vec![characteristic(10, false, false), characteristic(11, true, false)],
        }];
        let selected = select_write_characteristic(&services).unwrap();
        assert_eq!(selected.uuid, Uuid::from_u128(11));
        assert_eq!(selected.write_mode(), Some(WriteMode::WithResponse));
    }

    #[test]
    fn test_no_writable_characteristic() {
        let services = vec![GattService {
            uuid: Uuid::from_u128(1),
            characteristics: vec![characteristic(10, false, false)],
        }];
        assert_eq!(select_write_characteristic(&services), None);
        assert_eq!(select_write_characteristic(&[]), None);
    }

    #[test]
    fn test_paired_device_record() {
        let device = Device::paired("00:11:22:33:44:55", "PT-210");
        assert_eq!(device.id, "00:11:22:33:44:55");
        assert_eq!(device.kind, DeviceKind::Classic);
        assert_eq!(device.rssi, None);
        assert!(device.is_paired);
    }
}
