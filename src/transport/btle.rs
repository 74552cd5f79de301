//! # Bluetooth LE Transport (btleplug)
//!
//! [`BtleAdapter`] drives the platform BLE stack through btleplug and, on
//! Linux, hands Classic links to the [`super::rfcomm`] backend.
//!
//! ## Event Mapping
//!
//! | btleplug | Emitted |
//! |----------|---------|
//! | `CentralEvent::DeviceDiscovered` / `DeviceUpdated` | `Device` on the scan channel |
//! | `CentralEvent::DeviceDisconnected` (our peripheral) | `GattEvent::Disconnected` |
//! | `write(.., WithResponse)` returns `Ok` | `GattEvent::WriteCompleted { success: true }` |
//!
//! btleplug has no MTU exchange API, so [`GattClient::request_mtu`] reports
//! `Unsupported` and the session treats the MTU as unknown.

use std::sync::Mutex;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    BluetoothAdapter, Device, DeviceKind, GattCharacteristic, GattClient, GattEvent, GattLink,
    GattService, RfcommStream, WriteMode,
};
use crate::error::TransportError;

fn adapter_err(e: btleplug::Error) -> TransportError {
    TransportError::Adapter(e.to_string())
}

fn gatt_err(e: btleplug::Error) -> TransportError {
    TransportError::Gatt(e.to_string())
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct BtleAdapter {
    adapter: Adapter,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl BtleAdapter {
    /// Use the first adapter the platform reports.
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(adapter_err)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(adapter_err)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Adapter("No BLE adapter found".into()))?;
        Ok(Self {
            adapter,
            scan_task: Mutex::new(None),
        })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, TransportError> {
        for peripheral in self.adapter.peripherals().await.map_err(adapter_err)? {
            if peripheral.id().to_string() == address {
                return Ok(peripheral);
            }
            if let Ok(Some(props)) = peripheral.properties().await {
                if props.address.to_string().eq_ignore_ascii_case(address) {
                    return Ok(peripheral);
                }
            }
        }
        Err(TransportError::NotFound(address.to_string()))
    }

    fn replace_scan_task(&self, task: Option<JoinHandle<()>>) {
        let mut slot = self.scan_task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = std::mem::replace(&mut *slot, task) {
            old.abort();
        }
    }
}

async fn device_record(adapter: &Adapter, id: &PeripheralId) -> Option<Device> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok()??;
    let address = props.address.to_string();
    Some(Device {
        id: id.to_string(),
        name: props.local_name.unwrap_or_else(|| address.clone()),
        address,
        kind: DeviceKind::Ble,
        rssi: props.rssi,
        is_paired: false,
    })
}

#[async_trait]
impl BluetoothAdapter for BtleAdapter {
    async fn is_powered(&self) -> bool {
        self.adapter.adapter_info().await.is_ok()
    }

    async fn start_scan(&self, found: mpsc::UnboundedSender<Device>) -> Result<(), TransportError> {
        let mut events = self.adapter.events().await.map_err(adapter_err)?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(adapter_err)?;
        info!("BLE scan started");

        let adapter = self.adapter.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                if let Some(device) = device_record(&adapter, &id).await {
                    if found.send(device).is_err() {
                        break;
                    }
                }
            }
        });
        self.replace_scan_task(Some(task));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.replace_scan_task(None);
        self.adapter.stop_scan().await.map_err(adapter_err)?;
        info!("BLE scan stopped");
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>, TransportError> {
        #[cfg(target_os = "linux")]
        {
            super::rfcomm::paired_devices().await
        }
        #[cfg(not(target_os = "linux"))]
        {
            Ok(Vec::new())
        }
    }

    async fn connect_gatt(&self, address: &str) -> Result<GattLink, TransportError> {
        let peripheral = self.find_peripheral(address).await?;
        let mut central_events = self.adapter.events().await.map_err(adapter_err)?;

        peripheral.connect().await.map_err(gatt_err)?;
        info!(address, "GATT connected");

        let (tx, rx) = mpsc::unbounded_channel();
        let watched = peripheral.id();
        let events_tx = tx.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == watched {
                        let _ = events_tx.send(GattEvent::Disconnected);
                        break;
                    }
                }
                if events_tx.is_closed() {
                    break;
                }
            }
        });

        Ok(GattLink {
            client: Box::new(BtleGattClient {
                peripheral,
                events: tx,
                watcher,
            }),
            events: rx,
        })
    }

    async fn connect_rfcomm(&self, address: &str) -> Result<Box<dyn RfcommStream>, TransportError> {
        #[cfg(target_os = "linux")]
        {
            Ok(Box::new(super::rfcomm::open_for_address(address).await?))
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(TransportError::Unsupported(format!(
                "Classic links are not available on this platform ({})",
                address
            )))
        }
    }
}

// ============================================================================
// GATT CLIENT
// ============================================================================

struct BtleGattClient {
    peripheral: Peripheral,
    events: mpsc::UnboundedSender<GattEvent>,
    watcher: JoinHandle<()>,
}

#[async_trait]
impl GattClient for BtleGattClient {
    async fn request_mtu(&mut self, _mtu: u16) -> Result<u16, TransportError> {
        Err(TransportError::Unsupported(
            "btleplug does not expose MTU negotiation".into(),
        ))
    }

    async fn discover_services(&mut self) -> Result<Vec<GattService>, TransportError> {
        self.peripheral.discover_services().await.map_err(gatt_err)?;
        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        write: c.properties.contains(CharPropFlags::WRITE),
                        write_without_response: c
                            .properties
                            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();
        debug!(count = services.len(), "Discovered GATT services");
        Ok(services)
    }

    async fn write(
        &mut self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid)
            .ok_or_else(|| TransportError::Gatt(format!("characteristic {} gone", characteristic.uuid)))?;

        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        let result = self.peripheral.write(&target, data, write_type).await;

        if mode == WriteMode::WithResponse {
            let _ = self.events.send(GattEvent::WriteCompleted {
                success: result.is_ok(),
            });
        }
        result.map_err(gatt_err)
    }

    async fn is_connected(&mut self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.watcher.abort();
        if let Err(e) = self.peripheral.disconnect().await {
            warn!(error = %e, "GATT disconnect failed");
            return Err(gatt_err(e));
        }
        Ok(())
    }
}
