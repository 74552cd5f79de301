//! # Silver Printer - Thermal Printer Control over Bluetooth
//!
//! Silver Printer drives ESC/POS receipt printers over Bluetooth LE (GATT)
//! and Bluetooth Classic (RFCOMM/SPP). It provides:
//!
//! - **Protocol implementation**: ESC/POS command builders
//! - **Documents**: text runs, images, dividers and raw bytes encoded to one byte stream
//! - **Rasterizing**: RGBA pixel grids scaled and thresholded to 1-bit rows
//! - **Transport**: BLE first, Classic fallback for bonded devices
//! - **Transfer**: chunked, paced BLE writes with retry and cancellation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use silver_printer::{
//!     config::SessionConfig,
//!     document::{DocumentItem, PrintSettings, TextRun},
//!     protocol::text::Alignment,
//!     session::PrinterSession,
//!     transport::rfcomm::RfcommAdapter,
//! };
//!
//! # async fn run() -> Result<(), silver_printer::PrinterError> {
//! let session = PrinterSession::new(Arc::new(RfcommAdapter), SessionConfig::default());
//!
//! if session.connect("00:11:62:AA:BB:CC").await? {
//!     let items = vec![
//!         TextRun::new("RECEIPT").bold().align(Alignment::Center).into(),
//!         DocumentItem::divider('=', 32),
//!         TextRun::new("Coffee        3.50").into(),
//!     ];
//!     let settings = PrintSettings { feed_lines: Some(3), ..Default::default() };
//!     session.print_document(items, &settings).await?;
//!     session.cut_paper().await?;
//!     session.disconnect().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS command builders |
//! | [`ir`] | Op list, byte codegen and decoder |
//! | [`document`] | Document model and encoder |
//! | [`render`] | Pixel grid to monochrome raster |
//! | [`transport`] | Adapter seam, BLE/Classic links, mock adapter |
//! | [`transfer`] | Chunked transfer engine |
//! | [`session`] | Discovery, connection manager, print operations |
//! | [`printer`] | Paper profiles, connection state, printer status |
//! | [`config`] | Session configuration |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! Generic 58mm and 80mm ESC/POS printers that expose either a writable GATT
//! characteristic or an SPP channel.

pub mod config;
pub mod document;
pub mod error;
pub mod ir;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use config::SessionConfig;
pub use error::PrinterError;
pub use printer::{ConnectionState, PaperProfile, PrinterStatus};
pub use session::PrinterSession;
