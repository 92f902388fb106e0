//! Values and variables of the three-address code.
//!
//! The abstract operand stack holds [`Value`]s. Locals, parameters and literals are pushed by
//! reference: loading a local twice yields two equal values, not two copies. Every other value
//! is a variable of the method's inventory, identified by a [`VarId`].

use std::{fmt, sync::Arc};

use crate::metadata::{members::Member, token::Token, typesystem::TacType};

/// Index of a variable in a method's inventory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

impl VarId {
    /// Position in the inventory.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a variable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Declared local, by slot
    Local(u16),
    /// Parameter, by slot; slot 0 is `this` for instance methods
    Parameter(u16),
    /// Result of one TAC assignment
    Temporary,
    /// Placeholder for a stack slot fed by several control flow paths
    Merge,
    /// Exception delivered to a handler or filter entry
    CaughtException,
}

/// One entry of the variable inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Inventory index
    pub id: VarId,
    /// Origin
    pub kind: VariableKind,
    /// Static type
    pub ty: TacType,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VariableKind::Local(slot) => write!(f, "{} loc{slot}", self.ty),
            VariableKind::Parameter(slot) => write!(f, "{} arg{slot}", self.ty),
            VariableKind::Temporary | VariableKind::CaughtException => {
                write!(f, "{} t{}", self.ty, self.id.0)
            }
            VariableKind::Merge => write!(f, "{} m{}", self.ty, self.id.0),
        }
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `ldnull`
    Null,
    /// 32-bit integer
    I4(i32),
    /// 64-bit integer
    I8(i64),
    /// 32-bit float
    R4(f32),
    /// 64-bit float
    R8(f64),
    /// User string
    String(Arc<str>),
    /// `ldstr` whose token did not resolve
    UnresolvedString(Token),
    /// Runtime handle loaded by `ldtoken`
    Handle(Member),
}

impl Literal {
    /// Static type of the constant.
    #[must_use]
    pub fn ty(&self) -> TacType {
        match self {
            Literal::Null => TacType::Null,
            Literal::I4(_) => TacType::I32,
            Literal::I8(_) => TacType::I64,
            Literal::R4(_) => TacType::F32,
            Literal::R8(_) => TacType::F64,
            Literal::String(_) | Literal::UnresolvedString(_) => TacType::String,
            Literal::Handle(member) => TacType::value_type(match member {
                Member::Method(_) => "System.RuntimeMethodHandle",
                Member::Field(_) => "System.RuntimeFieldHandle",
                _ => "System.RuntimeTypeHandle",
            }),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::I4(v) => write!(f, "{v}"),
            Literal::I8(v) => write!(f, "{v}L"),
            Literal::R4(v) => write!(f, "{v:?}f"),
            Literal::R8(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::UnresolvedString(token) => write!(f, "<unresolved string {token}>"),
            Literal::Handle(member) => write!(f, "token({member})"),
        }
    }
}

/// An operand of a TAC statement and an entry of the abstract stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Local variable slot
    Local(u16),
    /// Parameter slot
    Param(u16),
    /// Constant
    Literal(Literal),
    /// Previously computed temporary, including caught exceptions
    Temp(VarId),
    /// Merge placeholder
    Merge(VarId),
}

impl Value {
    /// Shorthand for an `int32` literal.
    #[must_use]
    pub fn i4(value: i32) -> Self {
        Value::Literal(Literal::I4(value))
    }

    /// The inventory variable behind a temporary or merge.
    #[must_use]
    pub fn var(&self) -> Option<VarId> {
        match self {
            Value::Temp(id) | Value::Merge(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Local(slot) => write!(f, "loc{slot}"),
            Value::Param(slot) => write!(f, "arg{slot}"),
            Value::Literal(literal) => write!(f, "{literal}"),
            Value::Temp(id) => write!(f, "t{}", id.0),
            Value::Merge(id) => write!(f, "m{}", id.0),
        }
    }
}
