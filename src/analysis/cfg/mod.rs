//! Control flow graph construction.
//!
//! The decoded instruction list is partitioned into basic blocks by leader analysis. Leaders are
//! the method entry, every branch and switch target, the node after every instruction that ends a
//! block (branches, `switch`, `leave`, `ret`, `throw`, `rethrow`, `endfinally`, `endfilter`,
//! `jmp`), and the boundaries of every exception region: first protected instruction, first
//! instruction after the protected range, handler entry, first instruction after the handler and
//! filter entry. This makes every clause boundary coincide with a block boundary.
//!
//! Blocks are never split after construction. They are keyed by the [`crate::assembly::InstrId`]
//! of their entry, which also orders them.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::{
//!     analysis::cfg::ControlFlowGraph,
//!     assembly::{decode_method, InstructionEncoder},
//!     metadata::{resolver::MemoryResolver, token::Token},
//! };
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_ldarg(0)?;
//! encoder.emit_branch("brtrue.s", "skip")?;
//! encoder.emit_instruction("nop", None)?;
//! encoder.define_label("skip")?;
//! encoder.emit_instruction("ret", None)?;
//! let (code, _) = encoder.finalize()?;
//!
//! let list = decode_method(&code, Token::new(0x0600_0001), &MemoryResolver::new())?;
//! let cfg = ControlFlowGraph::build(&list, &[])?;
//! cfg.verify(&list, &[])?;
//! assert_eq!(cfg.block_count(), 3);
//! # Ok::<(), ciltac::Error>(())
//! ```

mod block;
mod graph;

pub use block::{BasicBlock, BlockEntry};
pub use graph::ControlFlowGraph;
