//! # ciltac Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ciltac library. Import this module to get quick access to everything needed to
//! translate method bodies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ciltac operations
pub use crate::Error;

/// The result type used throughout ciltac
pub use crate::Result;

// ================================================================================================
// Translation Entry Points
// ================================================================================================

/// Single-method and batch translation
pub use crate::analysis::{
    tac::{translate_method, TacMethod, TranslationConfig},
    translate_methods, BatchReport,
};

// ================================================================================================
// Three-Address Code
// ================================================================================================

/// Statements, expressions and values of the translated code
pub use crate::analysis::tac::{
    EhScope, EhStatement, Expr, Literal, Merge, Place, Statement, Value, VarId, Variable,
    VariableKind,
};

/// Block graph of a method
pub use crate::analysis::cfg::{BasicBlock, ControlFlowGraph};

// ================================================================================================
// Instructions
// ================================================================================================

/// Opcodes, decoded instructions and the encoder used to build method bodies
pub use crate::assembly::{
    ExceptionClause, HandlerKind, InstrId, Instruction, InstructionEncoder, InstructionList, Opcode,
};

// ================================================================================================
// Metadata Collaborators
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// The translator's type model and the type join
pub use crate::metadata::typesystem::{TacType, TypeHierarchy, TypeJoin};

/// Resolved member shapes
pub use crate::metadata::members::{CallSiteSig, FieldSig, Member, MethodSig};

/// Method bodies and the unit of translation
pub use crate::metadata::method::{ExceptionHandler, MethodBody, MethodDescriptor};

/// Token resolution
pub use crate::metadata::resolver::{CachingResolver, MemberResolver, MemoryResolver};
