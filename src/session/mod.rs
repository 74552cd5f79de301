//! # Printer Session
//!
//! [`PrinterSession`] is the one object a host talks to. It owns the
//! adapter, the discovery registry and the [`ConnectionManager`], and turns
//! print requests into encoded transfers.
//!
//! ## Operation Groups
//!
//! | Group | Operations |
//! |-------|------------|
//! | Discovery | `start_scan`, `stop_scan`, `discovered_devices`, `paired_devices`, `subscribe_discovery` |
//! | Connection | `connect`, `disconnect`, `connection_state`, `connected_device`, `is_connected`, `subscribe_connection_state` |
//! | Printing | `print_text`, `print_image`, `print_job`, `print_document`, `feed_paper`, `cut_paper`, `send_raw` |
//! | Status | `printer_status`, `subscribe_printer_status` |
//!
//! ## Results
//!
//! Connect and print operations resolve to `Ok(bool)`: `false` means the
//! link or the transfer failed and the reason was logged. Caller mistakes
//! (`InvalidArgument`, `NotConnected`, `BluetoothUnavailable`) and bad image
//! data (`EncodingFailure`) come back as `Err`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use silver_printer::config::SessionConfig;
//! use silver_printer::document::PrintSettings;
//! use silver_printer::session::PrinterSession;
//! use silver_printer::transport::mock::{GattBehavior, MockAdapter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), silver_printer::PrinterError> {
//! let adapter = MockAdapter::new().with_gatt(GattBehavior::printer(None));
//! let session = PrinterSession::new(Arc::new(adapter), SessionConfig::default());
//!
//! assert!(session.connect("printer-1").await?);
//! assert!(session.print_text("Hello", &PrintSettings::default()).await?);
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod discovery;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::document::{self, Document, DocumentItem, ImageItem, PrintSettings};
use crate::error::PrinterError;
use crate::printer::{ConnectionState, PrinterStatus};
use crate::protocol::commands;
use crate::render::raster::PixelGrid;
use crate::transport::{BluetoothAdapter, Device, DeviceKind};

pub use connection::ConnectionManager;
pub use discovery::{DeviceRegistry, Discovery};

pub struct PrinterSession {
    adapter: Arc<dyn BluetoothAdapter>,
    config: SessionConfig,
    discovery: Discovery,
    connection: ConnectionManager,
}

impl PrinterSession {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: SessionConfig) -> Self {
        let discovery = Discovery::new(Arc::clone(&adapter), config.discovery.rssi_threshold);
        let connection = ConnectionManager::new(
            Arc::clone(&adapter),
            config.connection,
            config.transfer,
        );
        Self {
            adapter,
            config,
            discovery,
            connection,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether an adapter is present and powered on.
    pub async fn is_bluetooth_available(&self) -> bool {
        self.adapter.is_powered().await
    }

    async fn require_adapter(&self) -> Result<(), PrinterError> {
        if self.adapter.is_powered().await {
            Ok(())
        } else {
            Err(PrinterError::BluetoothUnavailable)
        }
    }

    // ========================================================================
    // DISCOVERY
    // ========================================================================

    /// Start a scan. Earlier results are cleared; scanning twice is a no-op.
    pub async fn start_scan(&self) -> Result<bool, PrinterError> {
        self.require_adapter().await?;
        match self.discovery.start().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Could not start scan");
                Ok(false)
            }
        }
    }

    pub async fn stop_scan(&self) -> Result<bool, PrinterError> {
        self.require_adapter().await?;
        match self.discovery.stop().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Could not stop scan");
                Ok(false)
            }
        }
    }

    pub fn discovered_devices(&self) -> Vec<Device> {
        self.discovery.devices()
    }

    /// Devices bonded with this host, as Classic records without RSSI.
    pub async fn paired_devices(&self) -> Result<Vec<Device>, PrinterError> {
        self.require_adapter().await?;
        let devices = match self.adapter.bonded_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Could not list paired devices");
                return Ok(Vec::new());
            }
        };
        Ok(devices
            .into_iter()
            .map(|d| Device {
                kind: DeviceKind::Classic,
                is_paired: true,
                rssi: None,
                ..d
            })
            .collect())
    }

    pub fn subscribe_discovery(&self) -> broadcast::Receiver<Device> {
        self.discovery.subscribe()
    }

    // ========================================================================
    // CONNECTION
    // ========================================================================

    /// Connect by device id or address: BLE first, Classic for bonded devices.
    pub async fn connect(&self, device_id: &str) -> Result<bool, PrinterError> {
        let discovered = self.discovery.lookup(device_id.trim());
        self.connection.connect(device_id, discovered).await
    }

    pub async fn disconnect(&self) -> Result<bool, PrinterError> {
        self.connection.disconnect().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connected_device(&self) -> Option<Device> {
        self.connection.connected_device()
    }

    /// Connected and the link still looks alive.
    pub async fn is_connected(&self) -> bool {
        self.connection.check_health().await
    }

    pub fn subscribe_connection_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    // ========================================================================
    // PRINTING
    // ========================================================================

    pub async fn print_text(
        &self,
        text: &str,
        settings: &PrintSettings,
    ) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        let mut doc = Document::new().with(settings.text_run(text));
        Self::append_feed(&mut doc, settings);
        self.print(&doc).await
    }

    /// Print a pixel grid. `width`/`height` override the working size;
    /// alignment comes from `settings` and defaults to center.
    pub async fn print_image(
        &self,
        pixels: PixelGrid,
        width: Option<u32>,
        height: Option<u32>,
        settings: &PrintSettings,
    ) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        let mut image = ImageItem::new(pixels);
        image.target_width = width;
        image.target_height = height;
        if let Some(alignment) = settings.alignment {
            image.alignment = alignment;
        }

        let mut doc = Document::new().with(image);
        Self::append_feed(&mut doc, settings);
        self.print(&doc).await
    }

    /// Text (when non-empty) followed by an optional image, in one transfer.
    pub async fn print_job(
        &self,
        text: &str,
        image: Option<ImageItem>,
        settings: &PrintSettings,
    ) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        if text.is_empty() && image.is_none() {
            return Err(PrinterError::InvalidArgument(
                "A print job needs text or an image".into(),
            ));
        }

        let mut doc = Document::new();
        if !text.is_empty() {
            doc.push(settings.text_run(text));
        }
        if let Some(image) = image {
            doc.push(image);
        }
        Self::append_feed(&mut doc, settings);
        self.print(&doc).await
    }

    /// Print a structured document. Only `settings.feed_lines` applies.
    pub async fn print_document(
        &self,
        items: Vec<DocumentItem>,
        settings: &PrintSettings,
    ) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        let mut doc = Document::from(items);
        Self::append_feed(&mut doc, settings);
        self.print(&doc).await
    }

    /// Send exactly `lines` line feeds.
    pub async fn feed_paper(&self, lines: usize) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        if lines == 0 {
            return Err(PrinterError::InvalidArgument(
                "Feed needs at least one line".into(),
            ));
        }
        self.connection.send(commands::line_feeds(lines)).await
    }

    /// Send exactly `GS V 0`.
    pub async fn cut_paper(&self) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        self.connection.send(commands::cut()).await
    }

    /// Send bytes as-is.
    pub async fn send_raw(&self, data: Vec<u8>) -> Result<bool, PrinterError> {
        self.connection.ensure_connected()?;
        if data.is_empty() {
            return Err(PrinterError::InvalidArgument("No data to send".into()));
        }
        self.connection.send(data).await
    }

    fn append_feed(doc: &mut Document, settings: &PrintSettings) {
        if let Some(feed) = settings.feed_item() {
            doc.push(feed);
        }
    }

    async fn print(&self, doc: &Document) -> Result<bool, PrinterError> {
        let payload = document::encode(doc, &self.config.encoder)?;
        let ok = self.connection.send(payload).await?;
        if ok {
            info!(items = doc.items.len(), "Print job complete");
        }
        Ok(ok)
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Current status after a passive health check.
    pub async fn printer_status(&self) -> PrinterStatus {
        self.connection.check_health().await;
        self.connection.status()
    }

    pub fn subscribe_printer_status(&self) -> broadcast::Receiver<PrinterStatus> {
        self.connection.subscribe_status()
    }
}
