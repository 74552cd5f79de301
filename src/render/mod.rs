//! # Rendering Module
//!
//! Turns pixel data into something a thermal head can print.
//!
//! ## Modules
//!
//! - [`raster`]: RGBA grid → 1-bit packed raster (resize + luminance threshold)
//!
//! ## Usage Example
//!
//! ```
//! use silver_printer::render::raster::{self, PixelGrid, RasterOptions};
//!
//! let grid = PixelGrid::filled(640, 480, [0, 0, 0, 255]).unwrap();
//! let mono = raster::convert(&grid, None, None, &RasterOptions::default()).unwrap();
//!
//! assert_eq!(mono.width_bytes, 48); // 384 dots on 58mm paper
//! assert_eq!(mono.height, 288);
//! ```

pub mod raster;
