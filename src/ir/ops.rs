//! # IR Opcodes
//!
//! The intermediate representation for print jobs: a flat sequence of
//! opcodes, each mapping to exactly one ESC/POS command (or a run of text).
//!
//! ```text
//! Document → lower → Program (Vec<Op>) → codegen → bytes
//!                                 ▲                  │
//!                                 └──── decode ◄─────┘
//! ```
//!
//! Style changes are individual ops rather than bundled state, so a decoded
//! byte stream maps back onto the same op sequence the encoder produced.

use crate::protocol::text::Alignment;

/// IR opcodes, the "bytecode" for a print job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    // ========== Printer Control ==========
    /// Initialize printer (ESC @). Clears buffer and resets modes.
    Init,

    /// Full cut (GS V 0).
    Cut,

    /// One line feed (LF).
    Newline,

    // ========== Style Changes ==========
    /// Select print mode mask (ESC ! n). See [`crate::protocol::text::print_mode`].
    SetPrintMode(u8),

    /// Enable/disable emphasis (ESC E n).
    SetBold(bool),

    /// Enable/disable underline (ESC - n).
    SetUnderline(bool),

    /// Set justification (ESC a n).
    SetAlign(Alignment),

    /// Character size multiplier byte (GS ! n).
    /// High nibble = width - 1, low nibble = height - 1.
    SetCharSize(u8),

    /// Select character code table (ESC t n).
    SetCodePage(u8),

    // ========== Content ==========
    /// Printable text. Never contains control characters or newlines.
    Text(String),

    /// Raster bit image (GS v 0), MSB-first rows.
    Raster {
        width_bytes: u16,
        height: u16,
        data: Vec<u8>,
    },

    /// Bytes passed through untouched.
    Raw(Vec<u8>),
}

/// A sequence of IR ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub ops: Vec<Op>,
}

impl Program {
    /// Create an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a program that starts with Init.
    pub fn with_init() -> Self {
        Self { ops: vec![Op::Init] }
    }

    /// Add an op.
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Add multiple ops.
    pub fn extend(&mut self, ops: impl IntoIterator<Item = Op>) {
        self.ops.extend(ops);
    }

    /// Number of ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the program has no ops.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over ops.
    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }

    /// Append text, splitting it into `Text`, `Newline` and `Raw` ops.
    ///
    /// Newlines become [`Op::Newline`], other control characters are grouped
    /// into [`Op::Raw`], everything else into [`Op::Text`]. This is the same
    /// segmentation [`Program::decode`] produces, so lowered text round-trips.
    pub fn push_text(&mut self, content: &str) {
        let mut text = String::new();
        let mut raw = Vec::new();

        for c in content.chars() {
            if c == '\n' {
                self.flush_text(&mut text, &mut raw);
                self.ops.push(Op::Newline);
            } else if is_control(c) {
                if !text.is_empty() {
                    self.ops.push(Op::Text(std::mem::take(&mut text)));
                }
                raw.push(c as u8);
            } else {
                if !raw.is_empty() {
                    self.ops.push(Op::Raw(std::mem::take(&mut raw)));
                }
                text.push(c);
            }
        }
        self.flush_text(&mut text, &mut raw);
    }

    fn flush_text(&mut self, text: &mut String, raw: &mut Vec<u8>) {
        if !text.is_empty() {
            self.ops.push(Op::Text(std::mem::take(text)));
        }
        if !raw.is_empty() {
            self.ops.push(Op::Raw(std::mem::take(raw)));
        }
    }
}

/// ASCII control characters (C0 and DEL) that never appear inside `Op::Text`.
#[inline]
pub(crate) fn is_control(c: char) -> bool {
    (c as u32) < 0x20 || c == '\x7f'
}

impl FromIterator<Op> for Program {
    fn from_iter<T: IntoIterator<Item = Op>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Program {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_with_init() {
        let program = Program::with_init();
        assert_eq!(program.len(), 1);
        assert_eq!(program.ops[0], Op::Init);
    }

    #[test]
    fn test_push_text_plain() {
        let mut program = Program::new();
        program.push_text("Hello");
        assert_eq!(program.ops, vec![Op::Text("Hello".into())]);
    }

    #[test]
    fn test_push_text_splits_newlines() {
        let mut program = Program::new();
        program.push_text("a\n\nb\n");
        assert_eq!(
            program.ops,
            vec![
                Op::Text("a".into()),
                Op::Newline,
                Op::Newline,
                Op::Text("b".into()),
                Op::Newline,
            ]
        );
    }

    #[test]
    fn test_push_text_groups_control_chars() {
        let mut program = Program::new();
        program.push_text("a\t\tb");
        assert_eq!(
            program.ops,
            vec![
                Op::Text("a".into()),
                Op::Raw(vec![0x09, 0x09]),
                Op::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_push_text_keeps_unicode() {
        let mut program = Program::new();
        program.push_text("café ☕");
        assert_eq!(program.ops, vec![Op::Text("café ☕".into())]);
    }
}
