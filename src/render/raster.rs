//! # Monochrome Raster Conversion
//!
//! Converts an RGBA pixel grid into the 1-bit, MSB-first raster expected by
//! the `GS v 0` command.
//!
//! ## Pipeline
//!
//! ```text
//! PixelGrid (RGBA8, any size)
//!     │  working width: target rounded down to a multiple of 8, else paper width
//!     │  working height: aspect-preserving, clamped to an explicit target
//!     ▼
//! bilinear resize (image::imageops, FilterType::Triangle)
//!     │
//!     ▼
//! luminance L = 0.299 R + 0.587 G + 0.114 B   (alpha composited onto white)
//!     │  black when L < threshold (default 180)
//!     ▼
//! MonoRaster { width_bytes, height, data }
//! ```
//!
//! ## Why 180 and not 128?
//!
//! Thermal heads bleed slightly, so mid-grey pixels printed at a 128 cut-off
//! come out washed out. A higher cut-off prints more of the mid-tones black.
//!
//! ## Banding
//!
//! Thresholding and packing run over bands of [`BAND_ROWS`] rows with
//! `rayon`. Each band only touches its own slice of the output buffer.

use image::{RgbaImage, imageops::FilterType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PrinterError;
use crate::printer::PaperProfile;

/// Default luminance cut-off; pixels darker than this print black.
pub const DEFAULT_THRESHOLD: u8 = 180;

/// Rows processed per band.
pub const BAND_ROWS: usize = 100;

// ============================================================================
// INPUT
// ============================================================================

/// A raw RGBA8 pixel grid, row-major, 4 bytes per pixel.
///
/// Deserialization goes through [`PixelGrid::new`], so a grid read from
/// JSON is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PixelGridData")]
pub struct PixelGrid {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Deserialize)]
struct PixelGridData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TryFrom<PixelGridData> for PixelGrid {
    type Error = PrinterError;

    fn try_from(data: PixelGridData) -> Result<Self, Self::Error> {
        PixelGrid::new(data.width, data.height, data.rgba)
    }
}

impl PixelGrid {
    /// Wrap an RGBA buffer.
    ///
    /// Fails with [`PrinterError::EncodingFailure`] when either dimension is
    /// zero or the buffer is not exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, PrinterError> {
        if width == 0 || height == 0 {
            return Err(PrinterError::EncodingFailure(format!(
                "Pixel grid has zero size ({}x{})",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(PrinterError::EncodingFailure(format!(
                "Pixel grid {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A grid of one repeated colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, PrinterError> {
        let count = width as usize * height as usize;
        let data = rgba.iter().copied().cycle().take(count * 4).collect();
        Self::new(width, height, data)
    }

    /// Decode a PNG/JPEG (or any format the `image` crate reads) into a grid.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, PrinterError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PrinterError::EncodingFailure(format!("Failed to decode image: {}", e)))?;
        let rgba = decoded.to_rgba8();
        let (w, h) = rgba.dimensions();
        Self::new(w, h, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.rgba
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// A packed 1-bit raster: `height` rows of `width_bytes` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoRaster {
    pub width_bytes: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Conversion knobs shared by every image in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// Width used when an image has no explicit target width
    pub paper: PaperProfile,
    /// Luminance cut-off; darker pixels print black
    pub threshold: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            paper: PaperProfile::MM58,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Compute the (width, height) an image is resized to before thresholding.
///
/// - Width: `target_width` rounded down to a multiple of 8, or the paper
///   width when absent.
/// - Height: the source aspect ratio applied to the working width (at least
///   one row), clamped to `target_height` when given.
///
/// ```
/// use silver_printer::render::raster::working_size;
///
/// assert_eq!(working_size(800, 400, Some(203), None, 384).unwrap(), (200, 100));
/// assert_eq!(working_size(100, 100, None, Some(50), 384).unwrap(), (384, 50));
/// ```
pub fn working_size(
    src_width: u32,
    src_height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
    default_width: u32,
) -> Result<(u32, u32), PrinterError> {
    let width = match target_width {
        Some(w) => w - w % 8,
        None => default_width - default_width % 8,
    };
    if width == 0 {
        return Err(PrinterError::EncodingFailure(format!(
            "Target width {:?} is narrower than one byte (8 dots)",
            target_width
        )));
    }
    if src_width == 0 || src_height == 0 {
        return Err(PrinterError::EncodingFailure(
            "Source image has zero size".into(),
        ));
    }

    let scaled = (src_height as u64 * width as u64 + src_width as u64 / 2) / src_width as u64;
    let mut height = scaled.clamp(1, u32::MAX as u64) as u32;
    if let Some(limit) = target_height {
        if limit == 0 {
            return Err(PrinterError::EncodingFailure(
                "Target height must be at least one row".into(),
            ));
        }
        height = height.min(limit);
    }

    Ok((width, height))
}

// ============================================================================
// CONVERSION
// ============================================================================

/// Convert a pixel grid into a packed monochrome raster.
pub fn convert(
    grid: &PixelGrid,
    target_width: Option<u32>,
    target_height: Option<u32>,
    options: &RasterOptions,
) -> Result<MonoRaster, PrinterError> {
    let (width, height) = working_size(
        grid.width,
        grid.height,
        target_width,
        target_height,
        options.paper.width_dots as u32,
    )?;

    let resized;
    let pixels: &[u8] = if (width, height) == (grid.width, grid.height) {
        &grid.rgba
    } else {
        let source = RgbaImage::from_raw(grid.width, grid.height, grid.rgba.clone())
            .ok_or_else(|| PrinterError::EncodingFailure("Pixel buffer size mismatch".into()))?;
        resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
        resized.as_raw()
    };

    let width = width as usize;
    let height = height as usize;
    let width_bytes = width.div_ceil(8);
    let threshold = options.threshold as f32;

    let mut data = vec![0u8; width_bytes * height];
    data.par_chunks_mut(width_bytes * BAND_ROWS)
        .enumerate()
        .for_each(|(band, out)| {
            let first_row = band * BAND_ROWS;
            for (i, row_out) in out.chunks_mut(width_bytes).enumerate() {
                let y = first_row + i;
                let row_in = &pixels[y * width * 4..(y + 1) * width * 4];
                pack_row_into(row_in, threshold, row_out);
            }
        });

    Ok(MonoRaster {
        width_bytes,
        height,
        data,
    })
}

/// Luminance of an RGBA pixel after compositing onto a white background.
#[inline]
pub fn luminance(px: [u8; 4]) -> f32 {
    let a = px[3] as f32 / 255.0;
    let over_white = |c: u8| c as f32 * a + 255.0 * (1.0 - a);
    0.299 * over_white(px[0]) + 0.587 * over_white(px[1]) + 0.114 * over_white(px[2])
}

/// Threshold one RGBA row and pack it MSB-first into `out`.
///
/// Bits past the end of the row stay 0 (white).
fn pack_row_into(row: &[u8], threshold: f32, out: &mut [u8]) {
    out.fill(0);
    for (x, px) in row.chunks_exact(4).enumerate() {
        if luminance([px[0], px[1], px[2], px[3]]) < threshold {
            out[x / 8] |= 0x80 >> (x % 8);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    #[test]
    fn test_grid_rejects_wrong_length() {
        assert!(matches!(
            PixelGrid::new(2, 2, vec![0; 15]),
            Err(PrinterError::EncodingFailure(_))
        ));
        assert!(PixelGrid::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_from_encoded_rejects_garbage() {
        let err = PixelGrid::from_encoded(b"definitely not a png").unwrap_err();
        assert!(matches!(err, PrinterError::EncodingFailure(_)));
    }

    #[test]
    fn test_working_width_rounds_down() {
        assert_eq!(working_size(100, 100, Some(207), None, 384).unwrap().0, 200);
        assert_eq!(working_size(100, 100, Some(8), None, 384).unwrap().0, 8);
        assert!(working_size(100, 100, Some(7), None, 384).is_err());
    }

    #[test]
    fn test_working_width_default() {
        assert_eq!(working_size(50, 10, None, None, 384).unwrap(), (384, 77));
    }

    #[test]
    fn test_working_height_clamped_by_target() {
        // Aspect height would be 768; the explicit target wins.
        assert_eq!(working_size(100, 200, None, Some(300), 384).unwrap(), (384, 300));
        // Target larger than aspect height leaves it unchanged.
        assert_eq!(working_size(200, 100, None, Some(1000), 384).unwrap(), (384, 192));
    }

    #[test]
    fn test_width_bytes_independent_of_aspect() {
        for (w, h) in [(10, 1000), (1000, 10), (333, 333), (1, 1)] {
            let grid = PixelGrid::filled(w, h, WHITE).unwrap();
            let raster = convert(&grid, Some(100), None, &RasterOptions::default()).unwrap();
            assert_eq!(raster.width_bytes, 12, "{}x{}", w, h);
        }
    }

    #[test]
    fn test_black_and_white_extremes() {
        let black = PixelGrid::filled(16, 2, BLACK).unwrap();
        let raster = convert(&black, Some(16), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.data, vec![0xFF; 4]);

        let white = PixelGrid::filled(16, 2, WHITE).unwrap();
        let raster = convert(&white, Some(16), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.data, vec![0x00; 4]);
    }

    #[test]
    fn test_threshold_is_180_not_128() {
        // Mid grey (150) is above 128 but below 180: prints black by default.
        let grey = PixelGrid::filled(8, 1, [150, 150, 150, 255]).unwrap();
        let raster = convert(&grey, Some(8), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.data, vec![0xFF]);

        let naive = RasterOptions {
            threshold: 128,
            ..Default::default()
        };
        let raster = convert(&grey, Some(8), None, &naive).unwrap();
        assert_eq!(raster.data, vec![0x00]);
    }

    #[test]
    fn test_transparent_pixels_are_white() {
        let clear = PixelGrid::filled(8, 1, [0, 0, 0, 0]).unwrap();
        let raster = convert(&clear, Some(8), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.data, vec![0x00]);
    }

    #[test]
    fn test_msb_first_packing_without_resize() {
        // Left half black, right half white, already 8x1.
        let mut rgba = Vec::new();
        for x in 0..8 {
            rgba.extend(if x < 4 { BLACK } else { WHITE });
        }
        let grid = PixelGrid::new(8, 1, rgba).unwrap();
        let raster = convert(&grid, Some(8), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.data, vec![0xF0]);
    }

    #[test]
    fn test_multiple_bands_cover_every_row() {
        let grid = PixelGrid::filled(8, 250, BLACK).unwrap();
        let raster = convert(&grid, Some(8), None, &RasterOptions::default()).unwrap();
        assert_eq!(raster.height, 250);
        assert_eq!(raster.data.len(), 250);
        assert!(raster.data.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_pack_pads_with_white() {
        let mut out = [0xAA; 2];
        pack_row_into(&[0, 0, 0, 255].repeat(3), DEFAULT_THRESHOLD as f32, &mut out);
        assert_eq!(out, [0b1110_0000, 0x00]);
    }

    #[test]
    fn test_luminance_weights() {
        assert!((luminance([255, 0, 0, 255]) - 76.245).abs() < 0.01);
        assert!((luminance([0, 255, 0, 255]) - 149.685).abs() < 0.01);
        assert!((luminance([0, 0, 255, 255]) - 29.07).abs() < 0.01);
    }
}
