//! # ESC/POS Text Styling Commands
//!
//! Formatting commands for text runs.
//!
//! ## Text Styling Overview
//!
//! | Style | Command | Effect |
//! |-------|---------|--------|
//! | Print mode | ESC ! n | Font B, emphasis, double width/height in one mask |
//! | Bold | ESC E n | **Emphasized** text |
//! | Underline | ESC - n | Underlined text |
//! | Alignment | ESC a n | Left / center / right |
//! | Character size | GS ! n | Width and height multipliers |
//!
//! ## Text Alignment
//!
//! ```text
//! Left aligned (default)    |LEFT TEXT
//! Center aligned            |  CENTER TEXT
//! Right aligned             |      RIGHT TEXT
//! ```
//!
//! Alignment only takes effect at the start of a line, so it must be sent
//! before the text it applies to.

use serde::{Deserialize, Serialize};

use super::commands::{ESC, GS};

// ============================================================================
// TEXT ALIGNMENT
// ============================================================================

/// Text alignment options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left = 0,
    Center = 1,
    Right = 2,
}

impl Alignment {
    /// Parse the `n` parameter of `ESC a n`.
    pub fn from_byte(n: u8) -> Option<Self> {
        match n {
            0 | b'0' => Some(Alignment::Left),
            1 | b'1' => Some(Alignment::Center),
            2 | b'2' => Some(Alignment::Right),
            _ => None,
        }
    }
}

/// # Select Justification (ESC a n)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC a n |
/// | Hex     | 1B 61 n |
/// | Decimal | 27 97 n |
///
/// ## Parameters
///
/// - `n = 0`: Left alignment (default)
/// - `n = 1`: Center alignment
/// - `n = 2`: Right alignment
///
/// ## Example
///
/// ```
/// use silver_printer::protocol::text::{align, Alignment};
///
/// assert_eq!(align(Alignment::Center), vec![0x1B, 0x61, 0x01]);
/// ```
pub fn align(alignment: Alignment) -> Vec<u8> {
    vec![ESC, b'a', alignment as u8]
}

/// Convenience function for left alignment
#[inline]
pub fn align_left() -> Vec<u8> {
    align(Alignment::Left)
}

/// Convenience function for center alignment
#[inline]
pub fn align_center() -> Vec<u8> {
    align(Alignment::Center)
}

// ============================================================================
// TEXT EMPHASIS AND UNDERLINE
// ============================================================================

/// # Turn Emphasized Mode On (ESC E 1)
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | Hex     | 1B 45 01 |
#[inline]
pub fn bold_on() -> Vec<u8> {
    vec![ESC, b'E', 1]
}

/// # Turn Emphasized Mode Off (ESC E 0)
#[inline]
pub fn bold_off() -> Vec<u8> {
    vec![ESC, b'E', 0]
}

/// # Turn Underline On (ESC - 1)
///
/// One-dot underline. `ESC - 2` (two-dot) exists but is not used here.
#[inline]
pub fn underline_on() -> Vec<u8> {
    vec![ESC, b'-', 1]
}

/// # Turn Underline Off (ESC - 0)
#[inline]
pub fn underline_off() -> Vec<u8> {
    vec![ESC, b'-', 0]
}

// ============================================================================
// PRINT MODE (ESC !)
// ============================================================================

/// Bit flags for `ESC ! n`. Only Font B is used; sizes go through `GS !`.
pub mod print_mode {
    /// Font B (9×17) instead of Font A (12×24)
    pub const FONT_B: u8 = 0x01;
}

/// # Select Print Mode (ESC ! n)
///
/// Sets several character attributes at once from a bit mask.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC ! n  |
/// | Hex     | 1B 21 n  |
/// | Decimal | 27 33 n  |
///
/// ## Mask Bits
///
/// | Bit | Value | Meaning |
/// |-----|-------|---------|
/// | 0 | 0x01 | Font B |
/// | 3 | 0x08 | Emphasized |
/// | 4 | 0x10 | Double height |
/// | 5 | 0x20 | Double width |
/// | 7 | 0x80 | Underline |
///
/// `ESC ! 0` clears every bit, which is how the encoder leaves Font B after
/// a small text run.
///
/// ```
/// use silver_printer::protocol::text::{print_mode, select_print_mode};
///
/// assert_eq!(select_print_mode(print_mode::FONT_B), vec![0x1B, 0x21, 0x01]);
/// assert_eq!(select_print_mode(0), vec![0x1B, 0x21, 0x00]);
/// ```
#[inline]
pub fn select_print_mode(mask: u8) -> Vec<u8> {
    vec![ESC, b'!', mask]
}

// ============================================================================
// CHARACTER SIZE
// ============================================================================

/// Character size presets used by documents and print settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextSize {
    /// Font B via `ESC ! 1`
    Small,
    /// 1×1 via `GS ! 0x00`
    #[default]
    Normal,
    /// 2×2 via `GS ! 0x11`
    Large,
    /// 3×3 via `GS ! 0x22`
    ExtraLarge,
}

impl TextSize {
    /// The `GS !` parameter for this size (`Small` uses Font B at 1×1).
    pub fn gs_parameter(self) -> u8 {
        match self {
            TextSize::Small | TextSize::Normal => 0x00,
            TextSize::Large => 0x11,
            TextSize::ExtraLarge => 0x22,
        }
    }

    /// Inverse of [`TextSize::gs_parameter`] for the sizes that use `GS !`.
    pub fn from_gs_parameter(n: u8) -> Option<Self> {
        match n {
            0x00 => Some(TextSize::Normal),
            0x11 => Some(TextSize::Large),
            0x22 => Some(TextSize::ExtraLarge),
            _ => None,
        }
    }
}

/// # Select Character Size (GS ! n)
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS ! n   |
/// | Hex     | 1D 21 n  |
/// | Decimal | 29 33 n  |
///
/// ## Parameters
///
/// High nibble is the width multiplier minus one, low nibble the height
/// multiplier minus one:
///
/// | n | Size |
/// |---|------|
/// | 0x00 | 1×1 |
/// | 0x11 | 2×2 |
/// | 0x22 | 3×3 |
pub fn char_size(n: u8) -> Vec<u8> {
    vec![GS, b'!', n]
}

/// Emit the command(s) that select `size`.
///
/// ```
/// use silver_printer::protocol::text::{size, TextSize};
///
/// assert_eq!(size(TextSize::Small), vec![0x1B, 0x21, 0x01]);
/// assert_eq!(size(TextSize::Large), vec![0x1D, 0x21, 0x11]);
/// ```
pub fn size(size: TextSize) -> Vec<u8> {
    match size {
        TextSize::Small => select_print_mode(print_mode::FONT_B),
        other => char_size(other.gs_parameter()),
    }
}

// ============================================================================
// RESET
// ============================================================================

/// Return every text attribute to the left/normal/unbold/no-underline
/// baseline.
///
/// The trailing two commands are always `ESC E 0` then `ESC a 0`.
pub fn reset_style() -> Vec<u8> {
    let mut out = Vec::with_capacity(15);
    out.extend(select_print_mode(0));
    out.extend(char_size(0));
    out.extend(underline_off());
    out.extend(bold_off());
    out.extend(align_left());
    out
}

// ============================================================================
// TESTS
// ============================================================================
