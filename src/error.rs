//! # Error Types
//!
//! This module defines the error types used throughout the library.
//!
//! ## Layers
//!
//! | Type | Raised by | Reaches the caller? |
//! |------|-----------|---------------------|
//! | [`TransportError`] | adapters, GATT clients, RFCOMM streams | never directly |
//! | [`TransferError`] | the chunked transfer engine | never directly |
//! | [`PrinterError`] | [`crate::session::PrinterSession`] | yes |
//!
//! Transport and transfer errors are converted at the session boundary. A
//! failed connection or transfer is reported as `Ok(false)`; only caller
//! mistakes and local conditions come back as `Err`.

use thiserror::Error;

/// Main error type for printer session operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Required input missing or malformed (empty device id, empty payload)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Adapter absent or powered off
    #[error("Bluetooth is not available or not enabled")]
    BluetoothUnavailable,

    /// Print or transfer attempted while not connected
    #[error("No device connected")]
    NotConnected,

    /// Both BLE and Classic attempts were exhausted
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error or exhausted chunk retry during a transfer
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Image data could not be turned into a raster
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a Bluetooth backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("GATT error: {0}")]
    Gatt(String),

    #[error("RFCOMM error: {0}")]
    Rfcomm(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Link disconnected")]
    Disconnected,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a transfer did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A chunk failed twice (initial write + one retry).
    #[error("chunk {index} failed after retry: {reason}")]
    ChunkFailed { index: usize, reason: String },

    /// The link dropped mid-transfer.
    #[error("link disconnected during transfer")]
    Disconnected,

    /// `disconnect()` was called while the transfer was in flight.
    #[error("transfer cancelled")]
    Cancelled,

    /// Classic stream write or flush failed.
    #[error("stream error: {0}")]
    Stream(#[from] TransportError),
}

impl From<TransferError> for PrinterError {
    fn from(err: TransferError) -> Self {
        PrinterError::TransferFailed(err.to_string())
    }
}
