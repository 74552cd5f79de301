//! # ESC/POS Protocol Implementation
//!
//! Low-level command builders for the ESC/POS protocol spoken by most
//! receipt and label thermal printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Printer control (init, feed, cut, code page)
//! - [`text`]: Text styling (alignment, size, bold, underline)
//! - [`graphics`]: Raster bit images (`GS v 0`)
//!
//! ## Usage Example
//!
//! ```
//! use silver_printer::protocol::{commands, text};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(text::align_center());
//! data.extend(text::bold_on());
//! data.extend(b"RECEIPT\n");
//! data.extend(text::reset_style());
//! data.extend(commands::cut());
//! ```

pub mod commands;
pub mod graphics;
pub mod text;
