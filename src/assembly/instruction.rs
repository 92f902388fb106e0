//! Decoded instruction nodes and the vocabulary describing them.
//!
//! Instructions live in an [`crate::assembly::InstructionList`] arena and refer to each other
//! through [`InstrId`] handles instead of pointers. An id is assigned once, in stream order, and
//! doubles as the stable position key used by the block graph, the translator and every map
//! keyed by instruction.
//!
//! # Key Components
//!
//! - [`Instruction`] - One node of the list: an opcode or a switch-table entry
//! - [`Operand`] - Decoded inline operand, with branch targets resolved to nodes
//! - [`OperandType`] - Encoded operand kind of an opcode
//! - [`FlowType`] - Control flow behavior of an opcode
//! - [`OpcodeClass`] - Semantic grouping used by the translator
//!
//! # Examples
//!
//! ```rust
//! use ciltac::assembly::{FlowType, Immediate, OperandType};
//!
//! assert_eq!(OperandType::ShortBranch.size(), Some(1));
//! assert_eq!(OperandType::Switch.size(), None);
//! assert_eq!(Immediate::Int8(-2).as_i64(), Some(-2));
//! assert!(FlowType::Leave.is_interruptor());
//! assert!(!FlowType::Leave.is_terminal());
//! ```

use std::fmt;

use crate::{assembly::opcodes::Opcode, metadata::members::Member};

/// Encoded operand kinds of CIL opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer, a short local or argument index
    UInt8,
    /// Unsigned 16-bit integer, a long local or argument index
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Signed 8-bit branch displacement
    ShortBranch,
    /// Signed 32-bit branch displacement
    Branch,
    /// Length-prefixed table of 32-bit branch displacements
    Switch,
}

impl OperandType {
    /// Size in bytes of the operand, `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::ShortBranch => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token | OperandType::Branch => {
                Some(4)
            }
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// Semantic grouping of opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// `nop`, `break`, `localloc`, block operations, `arglist`
    Misc,
    /// Instruction prefixes
    Prefix,
    /// Loads of arguments, locals, constants, strings, tokens and function pointers
    Load,
    /// Address-of loads for arguments and locals
    LoadAddress,
    /// Stores to arguments and locals
    Store,
    /// `dup` and `pop`
    Stack,
    /// Arithmetic, including overflow-checked forms
    Arithmetic,
    /// Bitwise logic and shifts
    Bitwise,
    /// `ceq`, `cgt`, `clt` and unsigned forms
    Compare,
    /// Numeric conversions
    Convert,
    /// Branches and `switch`
    Branch,
    /// The call family
    Call,
    /// `ret`
    Return,
    /// Object model instructions
    Object,
    /// Field access
    Field,
    /// Array access
    Array,
    /// Indirect loads and stores through pointers
    Indirect,
    /// `throw`, `rethrow`, `leave`, `endfinally` and `endfilter`
    ExceptionHandling,
}

/// How control continues after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Conditional branch, falls through when not taken
    ConditionalBranch,
    /// Unconditional branch
    UnconditionalBranch,
    /// Multi-way branch through a jump table, falls through on out-of-range values
    Switch,
    /// Exit from a protected region
    Leave,
    /// Method return
    Return,
    /// Exception throw
    Throw,
    /// Rethrow of the current exception
    Rethrow,
    /// End of a `finally` or `fault` handler
    EndFinally,
    /// End of a filter predicate
    EndFilter,
    /// Transfer to another method with the current arguments
    Jump,
    /// Method call, execution continues afterwards
    Call,
}

impl FlowType {
    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub const fn is_interruptor(&self) -> bool {
        matches!(
            self,
            FlowType::UnconditionalBranch
                | FlowType::Leave
                | FlowType::Return
                | FlowType::Throw
                | FlowType::Rethrow
                | FlowType::EndFinally
                | FlowType::EndFilter
                | FlowType::Jump
        )
    }

    /// Returns `true` if the instruction has no successor inside the method.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowType::Return
                | FlowType::Throw
                | FlowType::Rethrow
                | FlowType::EndFinally
                | FlowType::EndFilter
                | FlowType::Jump
        )
    }

    /// Returns `true` if the instruction ends a basic block.
    #[must_use]
    pub const fn ends_block(&self) -> bool {
        self.is_interruptor() || matches!(self, FlowType::ConditionalBranch | FlowType::Switch)
    }
}

/// Inline immediate operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit integer
    Int8(i8),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
}

impl Immediate {
    /// Integer value, sign- or zero-extended according to the encoding.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Immediate::Int8(v) => Some(i64::from(v)),
            Immediate::UInt8(v) => Some(i64::from(v)),
            Immediate::UInt16(v) => Some(i64::from(v)),
            Immediate::Int32(v) => Some(i64::from(v)),
            Immediate::Int64(v) => Some(v),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }

    /// Local or argument index carried by `ldloc.s`, `starg` and friends.
    #[must_use]
    pub fn as_index(&self) -> Option<u16> {
        match *self {
            Immediate::UInt8(v) => Some(u16::from(v)),
            Immediate::UInt16(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(v) => write!(f, "{v}"),
            Immediate::UInt8(v) => write!(f, "{v}"),
            Immediate::UInt16(v) => write!(f, "{v}"),
            Immediate::Int32(v) => write!(f, "{v}"),
            Immediate::Int64(v) => write!(f, "{v}"),
            Immediate::Float32(v) => write!(f, "{v:?}"),
            Immediate::Float64(v) => write!(f, "{v:?}"),
        }
    }
}

/// Stable handle of an instruction node.
///
/// Ids grow with stream order, so ordering ids orders instructions. The sentinel is
/// [`InstrId::BACK`], which sorts after every real node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub u32);

impl InstrId {
    /// The sentinel node terminating every instruction list.
    pub const BACK: InstrId = InstrId(u32::MAX);

    /// Returns `true` for the sentinel.
    #[must_use]
    pub const fn is_back(self) -> bool {
        self.0 == u32::MAX
    }

    /// Arena index of the node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_back() {
            write!(f, "#back")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Decoded operand of an instruction node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Inline immediate value
    Immediate(Immediate),
    /// Absolute branch target offset, only present while decoding is in progress
    Offset(u32),
    /// Resolved branch target
    Target(InstrId),
    /// Number of entries in a switch table; the entries follow as separate nodes
    Switch(u32),
    /// Resolved metadata reference
    Member(Member),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Offset(offset) => write!(f, "IL_{offset:04X}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Switch(count) => write!(f, "({count} cases)"),
            Operand::Member(member) => write!(f, "{member}"),
        }
    }
}

/// What a node in the instruction list represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A real instruction
    Op(Opcode),
    /// One entry of the preceding `switch` table, holding only its target
    SwitchCase,
    /// The sentinel at the end of the list
    Back,
}

/// One node of the instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Stable position key
    pub id: InstrId,
    /// Opcode, switch case or sentinel
    pub kind: NodeKind,
    /// Byte offset within the method body
    pub offset: u32,
    /// Encoded size in bytes; switch cases account for their 4-byte table entry
    pub size: u32,
    /// Decoded operand
    pub operand: Operand,
    /// Previous node, the sentinel for the first instruction
    pub prev: InstrId,
    /// Next node, the sentinel for the last instruction
    pub next: InstrId,
}

impl Instruction {
    /// Opcode of a real instruction.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        match self.kind {
            NodeKind::Op(op) => Some(op),
            NodeKind::SwitchCase | NodeKind::Back => None,
        }
    }

    /// Returns `true` if the node has the given opcode.
    #[must_use]
    pub fn is(&self, opcode: Opcode) -> bool {
        self.kind == NodeKind::Op(opcode)
    }

    /// Returns `true` for switch cases and the sentinel.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        !matches!(self.kind, NodeKind::Op(_))
    }

    /// Control flow behavior; switch cases and the sentinel are sequential.
    #[must_use]
    pub fn flow(&self) -> FlowType {
        self.opcode().map_or(FlowType::Sequential, Opcode::flow)
    }

    /// Resolved branch target, if any.
    #[must_use]
    pub fn target(&self) -> Option<InstrId> {
        match self.operand {
            Operand::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Resolved metadata reference, if any.
    #[must_use]
    pub fn member(&self) -> Option<&Member> {
        match &self.operand {
            Operand::Member(member) => Some(member),
            _ => None,
        }
    }

    /// Immediate operand, if any.
    #[must_use]
    pub fn immediate(&self) -> Option<Immediate> {
        match self.operand {
            Operand::Immediate(imm) => Some(imm),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: ", self.offset)?;
        match self.kind {
            NodeKind::Op(op) => write!(f, "{op}")?,
            NodeKind::SwitchCase => write!(f, "case")?,
            NodeKind::Back => return write!(f, "<end>"),
        }
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
