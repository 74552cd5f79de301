//! # Session Configuration
//!
//! Every tunable of a [`crate::session::PrinterSession`] in one serde tree.
//! Missing fields take their defaults, so `{}` is a valid config.
//!
//! ```json
//! {
//!   "connection": { "ble_timeout_ms": 8000, "classic_timeout_ms": 10000, "requested_mtu": 512 },
//!   "transfer": {
//!     "chunk_size_without_response": 500, "pace_without_response_ms": 20,
//!     "chunk_size_with_response": 200, "pace_with_response_ms": 25,
//!     "burst_every": 5, "retry_delay_factor": 3,
//!     "ack_timeout_ms": 5000, "settle_delay_ms": 100
//!   },
//!   "encoder": { "code_page": 17, "paper": { "width_dots": 384, "dpi": 203 }, "threshold": 180 },
//!   "discovery": { "rssi_threshold": 5 }
//! }
//! ```
//!
//! `"code_page": null` disables the `ESC t n` command entirely.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PrinterError;
use crate::printer::PaperProfile;
use crate::protocol::commands::DEFAULT_CODE_PAGE;
use crate::render::raster::{DEFAULT_THRESHOLD, RasterOptions};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub transfer: TransferConfig,
    pub encoder: EncoderConfig,
    pub discovery: DiscoveryConfig,
}

impl SessionConfig {
    /// Parse a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, PrinterError> {
        serde_json::from_str(json).map_err(|e| PrinterError::Config(e.to_string()))
    }

    /// Read and parse a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PrinterError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PrinterError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline for GATT connect + MTU + service discovery
    pub ble_timeout_ms: u64,
    /// Deadline for opening the RFCOMM socket
    pub classic_timeout_ms: u64,
    /// MTU requested after the GATT link comes up
    pub requested_mtu: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ble_timeout_ms: 8_000,
            classic_timeout_ms: 10_000,
            requested_mtu: 512,
        }
    }
}

impl ConnectionConfig {
    pub fn ble_timeout(&self) -> Duration {
        Duration::from_millis(self.ble_timeout_ms)
    }

    pub fn classic_timeout(&self) -> Duration {
        Duration::from_millis(self.classic_timeout_ms)
    }
}

// ============================================================================
// TRANSFER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size_without_response: usize,
    pub pace_without_response_ms: u64,
    pub chunk_size_with_response: usize,
    pub pace_with_response_ms: u64,
    /// Without-response mode doubles the pause after every Nth chunk
    pub burst_every: usize,
    /// A failed chunk waits this many base delays before its retry
    pub retry_delay_factor: u32,
    /// Per-chunk wait for a write acknowledgement
    pub ack_timeout_ms: u64,
    /// Pause after the last chunk before reporting success
    pub settle_delay_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_without_response: 500,
            pace_without_response_ms: 20,
            chunk_size_with_response: 200,
            pace_with_response_ms: 25,
            burst_every: 5,
            retry_delay_factor: 3,
            ack_timeout_ms: 5_000,
            settle_delay_ms: 100,
        }
    }
}

impl TransferConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

// ============================================================================
// ENCODER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// `ESC t n` sent before text content; `None` disables it
    pub code_page: Option<u8>,
    pub paper: PaperProfile,
    /// Luminance cut-off for raster conversion
    pub threshold: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            code_page: Some(DEFAULT_CODE_PAGE),
            paper: PaperProfile::MM58,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EncoderConfig {
    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            paper: self.paper,
            threshold: self.threshold,
        }
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Minimum RSSI change (dBm) that re-announces a known device
    pub rssi_threshold: i16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { rssi_threshold: 5 }
    }
}
