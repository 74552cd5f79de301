//! # Paper Profiles
//!
//! Hardware characteristics of the common thermal paper widths.
//!
//! | Profile | Paper | Width (dots) | Resolution |
//! |---------|-------|--------------|------------|
//! | MM58 | 58mm | 384 | 203 DPI |
//! | MM80 | 80mm | 576 | 203 DPI |
//!
//! ## Usage
//!
//! ```
//! use silver_printer::printer::PaperProfile;
//!
//! let paper = PaperProfile::MM58;
//! assert_eq!(paper.width_bytes(), 48);
//! ```

use serde::{Deserialize, Serialize};

/// # Paper Profile
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
///
/// For 58mm paper at 203 DPI:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   printable = 384 / 8 = 48mm
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperProfile {
    /// Printable width in dots; always a multiple of 8
    pub width_dots: u16,

    /// Resolution in dots per inch
    pub dpi: u16,
}

impl PaperProfile {
    /// 58mm paper, 384 dots. The raster default when no width is given.
    pub const MM58: Self = Self {
        width_dots: 384,
        dpi: 203,
    };

    /// 80mm paper, 576 dots.
    pub const MM80: Self = Self {
        width_dots: 576,
        dpi: 203,
    };

    /// Row width in bytes (width_dots / 8)
    #[inline]
    pub fn width_bytes(&self) -> u16 {
        self.width_dots / 8
    }

    /// Calculate dots per millimeter
    ///
    /// ```
    /// use silver_printer::printer::PaperProfile;
    ///
    /// assert!((PaperProfile::MM58.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Printable width in millimeters
    #[inline]
    pub fn width_mm(&self) -> f32 {
        self.width_dots as f32 / self.dots_per_mm()
    }

    /// Characters per line in Font A (12 dots per character)
    #[inline]
    pub fn chars_per_line(&self) -> usize {
        self.width_dots as usize / 12
    }
}

impl Default for PaperProfile {
    fn default() -> Self {
        Self::MM58
    }
}
