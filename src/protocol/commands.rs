//! # ESC/POS Control Commands
//!
//! Printer-level commands that are not tied to text styling or graphics:
//! initialization, paper feed, cutting and code-page selection.
//!
//! ## Escape Sequence Structure
//!
//! ESC/POS commands are short byte sequences introduced by a prefix byte:
//! - Single byte: `LF`
//! - `ESC` prefixed: `ESC @`, `ESC a n`, `ESC t n`
//! - `GS` prefixed: `GS V m`, `GS ! n`, `GS v 0 ...`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for character size, raster graphics and the cutter.
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print the line buffer and advance one line
pub const LF: u8 = 0x0A;

/// Code page sent ahead of every text run unless configured otherwise.
pub const DEFAULT_CODE_PAGE: u8 = 0x11;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and returns every mode (emphasis, underline,
/// alignment, character size) to its power-on default.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
/// | Decimal | 27 64 |
///
/// ## Example
///
/// ```
/// use silver_printer::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

// ============================================================================
// PAPER FEED AND CUT
// ============================================================================

/// Feed `n` lines by repeating `LF`.
///
/// Zero lines produces an empty sequence.
///
/// ```
/// use silver_printer::protocol::commands;
///
/// assert_eq!(commands::line_feeds(3), vec![0x0A, 0x0A, 0x0A]);
/// ```
#[inline]
pub fn line_feeds(n: usize) -> Vec<u8> {
    vec![LF; n]
}

/// # Full Cut (GS V 0)
///
/// Cuts the paper at the current position.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V NUL |
/// | Hex     | 1D 56 00 |
/// | Decimal | 29 86 0  |
///
/// Printers without a cutter ignore the command.
#[inline]
pub fn cut() -> Vec<u8> {
    vec![GS, b'V', 0]
}

// ============================================================================
// CHARACTER CODE TABLE
// ============================================================================

/// # Select Character Code Table (ESC t n)
///
/// Selects the code page used for bytes 0x80-0xFF.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC t n  |
/// | Hex     | 1B 74 n  |
/// | Decimal | 27 116 n |
///
/// Text is always sent as UTF-8; this command only helps firmware that
/// expects a legacy table. Which table `n` maps to is model specific, so the
/// encoder takes it from configuration ([`DEFAULT_CODE_PAGE`] otherwise).
///
/// ```
/// use silver_printer::protocol::commands;
///
/// assert_eq!(commands::code_page(0x11), vec![0x1B, 0x74, 0x11]);
/// ```
#[inline]
pub fn code_page(n: u8) -> Vec<u8> {
    vec![ESC, b't', n]
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ```
/// use silver_printer::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(384), [0x80, 0x01]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================
