//! # Code Generation
//!
//! Converts IR programs to ESC/POS bytes.

use super::ops::{Op, Program};
use crate::protocol::{commands, graphics, text};

impl Program {
    /// Compile the IR program to ESC/POS bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for op in &self.ops {
            match op {
                // ===== Printer Control =====
                Op::Init => out.extend(commands::init()),
                Op::Cut => out.extend(commands::cut()),
                Op::Newline => out.push(commands::LF),

                // ===== Style Changes =====
                Op::SetPrintMode(mask) => out.extend(text::select_print_mode(*mask)),
                Op::SetBold(enabled) => {
                    if *enabled {
                        out.extend(text::bold_on());
                    } else {
                        out.extend(text::bold_off());
                    }
                }
                Op::SetUnderline(enabled) => {
                    if *enabled {
                        out.extend(text::underline_on());
                    } else {
                        out.extend(text::underline_off());
                    }
                }
                Op::SetAlign(alignment) => out.extend(text::align(*alignment)),
                Op::SetCharSize(n) => out.extend(text::char_size(*n)),
                Op::SetCodePage(page) => out.extend(commands::code_page(*page)),

                // ===== Content =====
                Op::Text(s) => out.extend(s.as_bytes()),
                Op::Raster {
                    width_bytes,
                    height,
                    data,
                } => out.extend(graphics::raster(*width_bytes, *height, data)),
                Op::Raw(bytes) => out.extend(bytes),
            }
        }

        out
    }
}
