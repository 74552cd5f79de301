//! # Printer Module
//!
//! Printer-facing descriptions that do not depend on a transport.
//!
//! ## Modules
//!
//! - [`config`]: Paper profiles (58mm / 80mm)
//! - [`status`]: Connection state and printer status

pub mod config;
pub mod status;

pub use config::PaperProfile;
pub use status::{ConnectionState, PrinterStatus};
