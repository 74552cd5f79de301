//! # Byte Stream Decoding
//!
//! Parses ESC/POS bytes back into IR ops. Used to inspect what a job will
//! do and to check that encoding round-trips.
//!
//! ## Recognized Commands
//!
//! | Bytes | Op |
//! |-------|----|
//! | `1B 40` | `Init` |
//! | `1B 21 n` | `SetPrintMode(n)` |
//! | `1B 45 00/01` | `SetBold` |
//! | `1B 2D 00/01` | `SetUnderline` |
//! | `1B 61 00..02` | `SetAlign` |
//! | `1B 74 n` | `SetCodePage(n)` |
//! | `1D 21 n` | `SetCharSize(n)` |
//! | `1D 56 00` | `Cut` |
//! | `1D 76 30 00 xL xH yL yH d…` | `Raster` |
//! | `0A` | `Newline` |
//!
//! Printable UTF-8 runs become `Text`. Anything else (unknown commands,
//! other parameters, truncated rasters, stray control bytes) is kept as
//! `Raw`, so `Program::decode(b).to_bytes() == b` for every input.

use super::ops::{Op, Program};
use crate::protocol::commands::{ESC, GS, LF};
use crate::protocol::graphics::RASTER_HEADER_LEN;
use crate::protocol::text::Alignment;

impl Program {
    /// Decode an ESC/POS byte stream into ops.
    ///
    /// ```
    /// use silver_printer::ir::{Op, Program};
    ///
    /// let program = Program::decode(&[0x1B, 0x40, b'H', b'i', 0x0A]);
    /// assert_eq!(program.ops, vec![Op::Init, Op::Text("Hi".into()), Op::Newline]);
    /// ```
    pub fn decode(bytes: &[u8]) -> Program {
        let mut decoder = Decoder::default();
        let mut i = 0;

        while i < bytes.len() {
            let rest = &bytes[i..];
            let parsed = match rest[0] {
                ESC => parse_esc(rest),
                GS => parse_gs(rest),
                LF => Some((Op::Newline, 1)),
                _ => None,
            };

            match parsed {
                Some((op, len)) => {
                    decoder.push(op);
                    i += len;
                }
                None => {
                    let b = rest[0];
                    if b < 0x20 || b == 0x7F {
                        decoder.push_raw(&[b]);
                    } else {
                        decoder.text.push(b);
                    }
                    i += 1;
                }
            }
        }

        decoder.finish()
    }
}

#[derive(Default)]
struct Decoder {
    program: Program,
    text: Vec<u8>,
}

impl Decoder {
    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let bytes = std::mem::take(&mut self.text);
        match String::from_utf8(bytes) {
            Ok(s) => self.program.push(Op::Text(s)),
            Err(e) => {
                let bytes = e.into_bytes();
                self.append_raw(&bytes);
            }
        }
    }

    fn push(&mut self, op: Op) {
        self.flush_text();
        self.program.push(op);
    }

    fn push_raw(&mut self, bytes: &[u8]) {
        self.flush_text();
        self.append_raw(bytes);
    }

    fn append_raw(&mut self, bytes: &[u8]) {
        if let Some(Op::Raw(prev)) = self.program.ops.last_mut() {
            prev.extend_from_slice(bytes);
        } else {
            self.program.push(Op::Raw(bytes.to_vec()));
        }
    }

    fn finish(mut self) -> Program {
        self.flush_text();
        self.program
    }
}

/// Parse an ESC-prefixed command. Returns the op and bytes consumed.
fn parse_esc(b: &[u8]) -> Option<(Op, usize)> {
    match *b.get(1)? {
        b'@' => Some((Op::Init, 2)),
        b'!' => Some((Op::SetPrintMode(*b.get(2)?), 3)),
        b'E' => match *b.get(2)? {
            0 => Some((Op::SetBold(false), 3)),
            1 => Some((Op::SetBold(true), 3)),
            _ => None,
        },
        b'-' => match *b.get(2)? {
            0 => Some((Op::SetUnderline(false), 3)),
            1 => Some((Op::SetUnderline(true), 3)),
            _ => None,
        },
        b'a' => {
            let n = *b.get(2)?;
            if n > 2 {
                return None;
            }
            Alignment::from_byte(n).map(|a| (Op::SetAlign(a), 3))
        }
        b't' => Some((Op::SetCodePage(*b.get(2)?), 3)),
        _ => None,
    }
}

/// Parse a GS-prefixed command. Returns the op and bytes consumed.
fn parse_gs(b: &[u8]) -> Option<(Op, usize)> {
    match *b.get(1)? {
        b'!' => Some((Op::SetCharSize(*b.get(2)?), 3)),
        b'V' => (*b.get(2)? == 0).then_some((Op::Cut, 3)),
        b'v' => parse_raster(b),
        _ => None,
    }
}

fn parse_raster(b: &[u8]) -> Option<(Op, usize)> {
    let header = b.get(..RASTER_HEADER_LEN)?;
    if header[2] != b'0' || header[3] != 0 {
        return None;
    }
    let width_bytes = u16::from_le_bytes([header[4], header[5]]);
    let height = u16::from_le_bytes([header[6], header[7]]);
    let len = width_bytes as usize * height as usize;
    let data = b.get(RASTER_HEADER_LEN..RASTER_HEADER_LEN + len)?;

    Some((
        Op::Raster {
            width_bytes,
            height,
            data: data.to_vec(),
        },
        RASTER_HEADER_LEN + len,
    ))
}
