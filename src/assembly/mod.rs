//! CIL instruction decoding.
//!
//! This module covers the first two pipeline stages: turning raw IL bytes into a linked
//! instruction list with resolved branch targets, and importing the method's exception clauses
//! onto that list.
//!
//! # Key Components
//!
//! - [`Opcode`] - The closed ECMA-335 opcode table
//! - [`Instruction`] / [`InstructionList`] - Arena-backed, sentinel-terminated instruction list
//! - [`decode_method`] - Two-pass decoder with branch resolution and switch expansion
//! - [`import_clauses`] - Maps byte-offset clauses onto instruction ranges
//! - [`InstructionEncoder`] - Assembles IL bytes from mnemonics, for tests and tooling
//!
//! # Examples
//!
//! ```rust
//! use ciltac::{
//!     assembly::{decode_method, import_clauses, InstructionEncoder},
//!     metadata::{method::ExceptionHandler, resolver::MemoryResolver, token::Token},
//! };
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.define_label("try")?;
//! encoder.emit_instruction("nop", None)?;
//! encoder.emit_branch("leave.s", "end")?;
//! encoder.define_label("handler")?;
//! encoder.emit_instruction("endfinally", None)?;
//! encoder.define_label("end")?;
//! encoder.emit_instruction("ret", None)?;
//! let (code, labels) = encoder.finalize()?;
//!
//! let resolver = MemoryResolver::new();
//! let method = Token::new(0x0600_0001);
//! let list = decode_method(&code, method, &resolver)?;
//! let clauses = import_clauses(
//!     &list,
//!     &[ExceptionHandler::finally(0, labels["handler"], labels["handler"], 1)],
//!     method,
//!     &resolver,
//! )?;
//! assert!(clauses[0].is_finally());
//! # Ok::<(), ciltac::Error>(())
//! ```

mod decoder;
mod encoder;
mod exceptions;
mod instruction;
mod list;
mod opcodes;

pub use decoder::decode_method;
pub use encoder::InstructionEncoder;
pub use exceptions::{import_clauses, ExceptionClause, HandlerKind};
pub use instruction::{
    FlowType, Immediate, InstrId, Instruction, NodeKind, OpcodeClass, Operand, OperandType,
};
pub use list::{InstructionList, Iter};
pub use opcodes::{Opcode, FE_PREFIX};
