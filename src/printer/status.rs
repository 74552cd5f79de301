//! Connection state and printer status enums.
//!
//! ```text
//!                 connect()                 link up
//! Disconnected ───────────► Connecting ─────────────► Connected
//!      ▲                        │                         │
//!      │     failure/timeout    │            disconnect() │
//!      ├────────────────────────┘                         ▼
//!      └─────────────────────────────────────────── Disconnecting
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Printer readiness as seen by callers.
///
/// Derived from the connection state and transfer activity: `Offline`
/// whenever there is no connection, otherwise `Ready`, `Busy` while a
/// transfer is in flight, or `Error` after a failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    #[default]
    Offline,
    Ready,
    Busy,
    Error,
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrinterStatus::Offline => "offline",
            PrinterStatus::Ready => "ready",
            PrinterStatus::Busy => "busy",
            PrinterStatus::Error => "error",
        };
        f.write_str(s)
    }
}
