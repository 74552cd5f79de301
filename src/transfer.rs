//! # Chunked Transfer Engine
//!
//! Moves an encoded payload over the active [`Connection`].
//!
//! ## Classic
//!
//! One `write_all` followed by `flush`. RFCOMM does its own flow control.
//!
//! ## BLE
//!
//! The payload is cut into chunks that fit a single characteristic write:
//!
//! | Write mode | Chunk | Base pause | Pacing |
//! |------------|-------|------------|--------|
//! | without response | 500 B | 20 ms | base between chunks, 2× base after every 5th |
//! | with response | 200 B | 25 ms | wait for `WriteCompleted`, then base |
//!
//! A known MTU caps the chunk at `mtu - 3` (ATT header).
//!
//! ```text
//! chunk ──write──► [ack?] ──pause──► next chunk
//!   │ error                              ...
//!   └──► wait 3× base ──► retry once ──► error ──► abort
//!
//! last chunk ──► settle (100 ms) ──► success
//! ```
//!
//! A `GattEvent::Disconnected` aborts at once. Every write, ack wait and
//! pause also watches the session's cancellation generation; a
//! `disconnect()` bumps it and the transfer ends with
//! [`TransferError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransportError};
use crate::transport::{BleConnection, Connection, GattEvent, WriteMode};

/// ATT header bytes subtracted from the MTU.
pub const ATT_HEADER_LEN: usize = 3;

// ============================================================================
// PLANNING
// ============================================================================

/// Chunk size and pacing for one BLE transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub chunk_size: usize,
    pub write_mode: WriteMode,
    pub pace_delay: Duration,
}

impl TransferPlan {
    /// Plan for `mode`, capped by the MTU when it is known.
    ///
    /// ```
    /// use silver_printer::config::TransferConfig;
    /// use silver_printer::transfer::TransferPlan;
    /// use silver_printer::transport::WriteMode;
    ///
    /// let config = TransferConfig::default();
    /// let plan = TransferPlan::new(WriteMode::WithoutResponse, Some(185), &config);
    /// assert_eq!(plan.chunk_size, 182);
    ///
    /// let plan = TransferPlan::new(WriteMode::WithResponse, None, &config);
    /// assert_eq!(plan.chunk_size, 200);
    /// ```
    pub fn new(mode: WriteMode, mtu: Option<u16>, config: &TransferConfig) -> Self {
        let (base_chunk, pace_ms) = match mode {
            WriteMode::WithoutResponse => (
                config.chunk_size_without_response,
                config.pace_without_response_ms,
            ),
            WriteMode::WithResponse => {
                (config.chunk_size_with_response, config.pace_with_response_ms)
            }
        };

        let mut chunk_size = base_chunk;
        if let Some(mtu) = mtu {
            let usable = (mtu as usize).saturating_sub(ATT_HEADER_LEN);
            if usable > 0 {
                chunk_size = chunk_size.min(usable);
            }
        }

        Self {
            chunk_size: chunk_size.max(1),
            write_mode: mode,
            pace_delay: Duration::from_millis(pace_ms),
        }
    }

    /// Pause after the chunk with zero-based `index`.
    ///
    /// Without-response transfers double the pause after every
    /// `burst_every`-th chunk so the printer's buffer can drain.
    pub fn pause_after(&self, index: usize, burst_every: usize) -> Duration {
        let sent = index + 1;
        if self.write_mode == WriteMode::WithoutResponse && burst_every > 0 && sent % burst_every == 0
        {
            self.pace_delay * 2
        } else {
            self.pace_delay
        }
    }

    /// Smallest total pause a transfer of `payload_len` bytes can take
    /// (pauses between chunks only, excluding acks and settle time).
    pub fn minimum_pacing(&self, payload_len: usize, burst_every: usize) -> Duration {
        let chunks = chunk_count(payload_len, self.chunk_size);
        (0..chunks.saturating_sub(1))
            .map(|i| self.pause_after(i, burst_every))
            .sum()
    }
}

/// Number of chunks: `ceil(len / chunk_size)`.
pub fn chunk_count(payload_len: usize, chunk_size: usize) -> usize {
    payload_len.div_ceil(chunk_size.max(1))
}

// ============================================================================
// JOB
// ============================================================================

/// A BLE payload in flight. Owned by exactly one transfer.
#[derive(Debug)]
pub struct TransferJob {
    pub payload: Vec<u8>,
    /// Bytes already delivered
    pub offset: usize,
    pub chunk_size: usize,
    pub write_mode: WriteMode,
    pub pace_delay: Duration,
}

impl TransferJob {
    pub fn new(payload: Vec<u8>, plan: TransferPlan) -> Self {
        Self {
            payload,
            offset: 0,
            chunk_size: plan.chunk_size,
            write_mode: plan.write_mode,
            pace_delay: plan.pace_delay,
        }
    }

    /// The next chunk to send, or `None` when done.
    pub fn next_chunk(&self) -> Option<&[u8]> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.payload.len());
        Some(&self.payload[self.offset..end])
    }

    /// Mark the current chunk delivered.
    pub fn advance(&mut self) {
        self.offset = (self.offset + self.chunk_size).min(self.payload.len());
    }

    pub fn chunk_index(&self) -> usize {
        self.offset / self.chunk_size
    }

    pub fn total_chunks(&self) -> usize {
        chunk_count(self.payload.len(), self.chunk_size)
    }

    pub fn is_last_chunk(&self) -> bool {
        self.offset + self.chunk_size >= self.payload.len()
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: usize,
    pub chunks: usize,
    pub retries: usize,
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Watches the session's cancellation generation.
///
/// The transfer is cancelled once the generation differs from the value
/// seen at start, or when the session side of the channel is gone.
pub struct Cancellation {
    rx: watch::Receiver<u64>,
    start: u64,
}

impl Cancellation {
    pub fn new(mut rx: watch::Receiver<u64>) -> Self {
        let start = *rx.borrow_and_update();
        Self { rx, start }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.start || self.rx.has_changed().is_err()
    }

    async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() != self.start {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Run `fut` unless cancellation wins first.
    async fn guard<T>(&mut self, fut: impl Future<Output = T>) -> Result<T, TransferError> {
        if self.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(TransferError::Cancelled),
            value = fut => Ok(value),
        }
    }

    async fn sleep(&mut self, duration: Duration) -> Result<(), TransferError> {
        self.guard(tokio::time::sleep(duration)).await
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Send `payload` over `connection`.
///
/// `cancel` should be created before waiting for the connection so a
/// disconnect that happens in between is still observed.
pub async fn run(
    connection: &mut Connection,
    payload: Vec<u8>,
    config: &TransferConfig,
    mut cancel: Cancellation,
) -> Result<TransferReport, TransferError> {
    let job_id = Uuid::new_v4();

    let result = match connection {
        Connection::Ble(ble) => run_ble(ble, payload, config, &mut cancel).await,
        Connection::Classic(_) => run_classic(connection, &payload, config, &mut cancel).await,
    };

    match &result {
        Ok(report) => info!(
            %job_id,
            bytes = report.bytes,
            chunks = report.chunks,
            retries = report.retries,
            "Transfer complete"
        ),
        Err(e) => warn!(%job_id, error = %e, "Transfer failed"),
    }
    result
}

fn stream_error(e: TransportError) -> TransferError {
    match e {
        TransportError::Disconnected => TransferError::Disconnected,
        other => TransferError::Stream(other),
    }
}

/// The whole payload as one `Connection::write`: `write_all` plus `flush`.
async fn run_classic(
    connection: &mut Connection,
    payload: &[u8],
    config: &TransferConfig,
    cancel: &mut Cancellation,
) -> Result<TransferReport, TransferError> {
    debug!(bytes = payload.len(), "Classic transfer");
    cancel
        .guard(connection.write(payload))
        .await?
        .map_err(stream_error)?;
    cancel.sleep(config.settle_delay()).await?;

    Ok(TransferReport {
        bytes: payload.len(),
        chunks: 1,
        retries: 0,
    })
}

/// Why a single chunk attempt did not go through.
enum AttemptError {
    /// Worth one retry
    Retryable(String),
    /// Ends the transfer immediately
    Fatal(TransferError),
}

impl From<TransferError> for AttemptError {
    fn from(e: TransferError) -> Self {
        AttemptError::Fatal(e)
    }
}

async fn run_ble(
    ble: &mut BleConnection,
    payload: Vec<u8>,
    config: &TransferConfig,
    cancel: &mut Cancellation,
) -> Result<TransferReport, TransferError> {
    ble.drain_stale_events().map_err(stream_error)?;

    let plan = TransferPlan::new(ble.write_mode, ble.mtu, config);
    let mut job = TransferJob::new(payload, plan);
    let total = job.total_chunks();
    debug!(
        bytes = job.payload.len(),
        chunk_size = plan.chunk_size,
        chunks = total,
        mode = ?plan.write_mode,
        mtu = ?ble.mtu,
        "BLE transfer plan"
    );

    let mut retries = 0;
    let mut late_acks = 0;
    while let Some(chunk) = job.next_chunk() {
        let index = job.chunk_index();

        match attempt(ble, chunk, plan.write_mode, config, cancel, &mut late_acks).await {
            Ok(()) => {}
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Retryable(reason)) => {
                warn!(index, total, %reason, "Chunk failed, retrying once");
                retries += 1;
                cancel
                    .sleep(plan.pace_delay * config.retry_delay_factor)
                    .await?;
                match attempt(ble, chunk, plan.write_mode, config, cancel, &mut late_acks).await {
                    Ok(()) => {}
                    Err(AttemptError::Fatal(e)) => return Err(e),
                    Err(AttemptError::Retryable(reason)) => {
                        return Err(TransferError::ChunkFailed { index, reason });
                    }
                }
            }
        }

        let last = job.is_last_chunk();
        job.advance();
        if !last {
            cancel
                .sleep(plan.pause_after(index, config.burst_every))
                .await?;
        }
    }

    cancel.sleep(config.settle_delay()).await?;

    Ok(TransferReport {
        bytes: job.payload.len(),
        chunks: total,
        retries,
    })
}

/// One write of one chunk, including the ack wait for with-response mode.
///
/// `late_acks` counts attempts whose acknowledgement timed out. Acks arrive
/// in write order, so that many `WriteCompleted` events still belong to
/// earlier writes and must not confirm this one.
async fn attempt(
    ble: &mut BleConnection,
    chunk: &[u8],
    mode: WriteMode,
    config: &TransferConfig,
    cancel: &mut Cancellation,
    late_acks: &mut usize,
) -> Result<(), AttemptError> {
    let drained = ble
        .drain_stale_events()
        .map_err(|_| TransferError::Disconnected)?;
    *late_acks = late_acks.saturating_sub(drained);

    match cancel.guard(ble.write_chunk(chunk)).await? {
        Ok(()) => {}
        Err(TransportError::Disconnected) => return Err(TransferError::Disconnected.into()),
        Err(e) => return Err(AttemptError::Retryable(e.to_string())),
    }

    if mode == WriteMode::WithoutResponse {
        return Ok(());
    }

    let ack = cancel
        .guard(tokio::time::timeout(config.ack_timeout(), next_ack(ble, late_acks)))
        .await?;
    match ack {
        Ok(Some(true)) => Ok(()),
        Ok(Some(false)) => Err(AttemptError::Retryable("write rejected by peer".into())),
        Ok(None) => Err(TransferError::Disconnected.into()),
        Err(_) => {
            *late_acks += 1;
            Err(AttemptError::Retryable(format!(
                "no acknowledgement within {:?}",
                config.ack_timeout()
            )))
        }
    }
}

/// Wait for this write's acknowledgement, skipping `late_acks` that belong
/// to earlier timed-out writes. `None` means the link dropped.
async fn next_ack(ble: &mut BleConnection, late_acks: &mut usize) -> Option<bool> {
    loop {
        match ble.events.recv().await? {
            GattEvent::WriteCompleted { .. } if *late_acks > 0 => {
                *late_acks -= 1;
                debug!("Ignoring late acknowledgement");
            }
            GattEvent::WriteCompleted { success } => return Some(success),
            GattEvent::Disconnected => return None,
            GattEvent::MtuChanged(mtu) => ble.mtu = Some(mtu),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
