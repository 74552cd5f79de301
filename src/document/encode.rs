//! # Document Encoding
//!
//! Lowers a [`Document`] to IR ops, then to ESC/POS bytes.
//!
//! ## Item Layouts
//!
//! ```text
//! Document   1B 40  <items...>
//!
//! Text       <size> [1B 45 01] [1B 2D 01] [1B 61 n] [1B 74 cp] <utf-8> [0A]
//!            1B 21 00  1D 21 00  1B 2D 00  1B 45 00  1B 61 00
//!
//! Image      1B 61 n  (1D 76 30 00 xL xH yL yH <rows>)+  1B 61 00
//!
//! LineFeed   0A × n
//!
//! Divider    1B 61 01  <char × width>  0A  1B 61 00
//!
//! Raw        <bytes>
//! ```
//!
//! Brackets mark conditional commands: bold/underline only when set,
//! alignment only when not left, code page only when configured and the run
//! is non-empty, the trailing `0A` only when the content does not already
//! end with a newline.

use tracing::debug;

use super::types::{Document, DocumentItem, ImageItem, TextRun};
use crate::config::EncoderConfig;
use crate::error::PrinterError;
use crate::ir::{Op, Program};
use crate::protocol::text::{Alignment, TextSize, print_mode};
use crate::render::raster;

/// Tallest raster block a single `GS v 0` header can describe.
pub const MAX_RASTER_ROWS: usize = u16::MAX as usize;

/// Encode a document to ESC/POS bytes.
///
/// ```
/// use silver_printer::config::EncoderConfig;
/// use silver_printer::document::{encode, Document};
///
/// let bytes = encode(&Document::new(), &EncoderConfig::default()).unwrap();
/// assert_eq!(bytes, vec![0x1B, 0x40]);
/// ```
pub fn encode(document: &Document, config: &EncoderConfig) -> Result<Vec<u8>, PrinterError> {
    let bytes = lower(document, config)?.to_bytes();
    debug!(items = document.items.len(), bytes = bytes.len(), "Encoded document");
    Ok(bytes)
}

/// Lower a document to an IR program. Always starts with `Init`.
pub fn lower(document: &Document, config: &EncoderConfig) -> Result<Program, PrinterError> {
    let mut program = Program::with_init();
    for item in &document.items {
        lower_item(&mut program, item, config)?;
    }
    Ok(program)
}

fn lower_item(
    program: &mut Program,
    item: &DocumentItem,
    config: &EncoderConfig,
) -> Result<(), PrinterError> {
    match item {
        DocumentItem::Text(run) => lower_text(program, run, config),
        DocumentItem::Image(image) => lower_image(program, image, config)?,
        DocumentItem::LineFeed { lines } => {
            program.extend(std::iter::repeat_n(Op::Newline, *lines));
        }
        DocumentItem::Divider { character, width } => {
            program.push(Op::SetAlign(Alignment::Center));
            let line: String = std::iter::repeat_n(*character, *width).collect();
            program.push_text(&line);
            program.push(Op::Newline);
            program.push(Op::SetAlign(Alignment::Left));
        }
        DocumentItem::Raw { data } => {
            if !data.is_empty() {
                program.push(Op::Raw(data.clone()));
            }
        }
    }
    Ok(())
}

// ============================================================================
// TEXT
// ============================================================================

fn size_op(size: TextSize) -> Op {
    match size {
        TextSize::Small => Op::SetPrintMode(print_mode::FONT_B),
        other => Op::SetCharSize(other.gs_parameter()),
    }
}

/// Ops that return every text attribute to its baseline.
///
/// Mirrors [`crate::protocol::text::reset_style`].
pub fn reset_ops() -> [Op; 5] {
    [
        Op::SetPrintMode(0),
        Op::SetCharSize(0),
        Op::SetUnderline(false),
        Op::SetBold(false),
        Op::SetAlign(Alignment::Left),
    ]
}

fn lower_text(program: &mut Program, run: &TextRun, config: &EncoderConfig) {
    program.push(size_op(run.size));
    if run.bold {
        program.push(Op::SetBold(true));
    }
    if run.underline {
        program.push(Op::SetUnderline(true));
    }
    if run.alignment != Alignment::Left {
        program.push(Op::SetAlign(run.alignment));
    }

    if !run.content.is_empty() {
        if let Some(page) = config.code_page {
            program.push(Op::SetCodePage(page));
        }
        program.push_text(&run.content);
    }
    if !run.content.ends_with('\n') {
        program.push(Op::Newline);
    }

    program.extend(reset_ops());
}

// ============================================================================
// IMAGE
// ============================================================================

fn lower_image(
    program: &mut Program,
    image: &ImageItem,
    config: &EncoderConfig,
) -> Result<(), PrinterError> {
    let mono = raster::convert(
        &image.pixels,
        image.target_width,
        image.target_height,
        &config.raster_options(),
    )?;

    let width_bytes = u16::try_from(mono.width_bytes).map_err(|_| {
        PrinterError::EncodingFailure(format!(
            "Raster width of {} bytes exceeds the GS v 0 limit",
            mono.width_bytes
        ))
    })?;

    debug!(
        width_bytes,
        height = mono.height,
        src_width = image.pixels.width(),
        src_height = image.pixels.height(),
        "Rasterized image"
    );

    program.push(Op::SetAlign(image.alignment));
    for block in mono.data.chunks(mono.width_bytes * MAX_RASTER_ROWS) {
        let rows = block.len() / mono.width_bytes;
        program.push(Op::Raster {
            width_bytes,
            height: rows as u16,
            data: block.to_vec(),
        });
    }
    program.push(Op::SetAlign(Alignment::Left));
    Ok(())
}
