//! # Intermediate Representation (IR)
//!
//! The IR is a "bytecode" representation that sits between documents and
//! raw ESC/POS protocol bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────┐
//! │  Document   │ ──► │     IR      │ ──► │ Codegen  │ ──► bytes
//! │ (items)     │     │  (Vec<Op>)  │     │          │       │
//! └─────────────┘     └─────────────┘     └──────────┘       │
//!                            ▲                                │
//!                            └────────── decode ◄─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use silver_printer::ir::{Op, Program};
//! use silver_printer::protocol::text::Alignment;
//!
//! let mut program = Program::with_init();
//! program.push(Op::SetAlign(Alignment::Center));
//! program.push(Op::SetBold(true));
//! program.push(Op::Text("HELLO".into()));
//! program.push(Op::Newline);
//! program.push(Op::Cut);
//!
//! let bytes = program.to_bytes();
//! assert_eq!(Program::decode(&bytes), program);
//! ```

mod codegen;
mod decode;
mod ops;

pub use ops::*;
