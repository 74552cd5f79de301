//! # Document Model
//!
//! A single type hierarchy that is both the Rust API and the JSON API.
//! `Document` is constructible in Rust and deserializable from JSON.
//!
//! ```
//! use silver_printer::config::EncoderConfig;
//! use silver_printer::document::*;
//!
//! // Rust construction
//! let doc = Document::new()
//!     .with(TextRun::new("Hello").center().bold())
//!     .with(DocumentItem::divider('-', 32));
//!
//! // JSON deserialization
//! let json: Document = serde_json::from_str(
//!     r#"{"items":[{"type":"text","content":"Hello","alignment":"center","bold":true},
//!                  {"type":"divider"}]}"#,
//! ).unwrap();
//! assert_eq!(doc, json);
//!
//! // Both produce bytes the same way
//! let bytes = encode(&doc, &EncoderConfig::default()).unwrap();
//! assert_eq!(&bytes[..2], &[0x1B, 0x40]);
//! ```

mod encode;
pub mod types;

pub use encode::{MAX_RASTER_ROWS, encode, lower, reset_ops};
pub use types::*;
