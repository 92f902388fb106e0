//! TAC statements and the expressions they evaluate.
//!
//! Every statement is either an assignment of one [`Expr`] to one [`Place`], a call evaluated
//! for its side effects, a return, an (un)conditional jump to a line of the statement list, or
//! one of the exception handling pseudo-statements in [`EhStatement`].
//!
//! Jump targets are indices into the statement list of the method. They are only ever rewritten
//! through [`crate::analysis::tac::LineTransformer`], which keeps them consistent when lines are
//! inserted or removed.
//!
//! # Field naming
//!
//! - `left`, `right`: binary operands, in the order they were pushed
//! - `operand`: unary operand
//! - `object`: instance for field access, `None` for static fields
//! - `array`, `index`: array element access
//! - `address`: pointer for indirect access
//! - `checked`, `unsigned`: overflow checking and unsigned interpretation of the inputs

#![allow(missing_docs)]

use std::fmt;

use strum::Display;

use crate::{
    analysis::tac::value::{Value, VarId},
    assembly::Opcode,
    metadata::{members::Member, typesystem::TacType},
};

// ========================================================================
// Operators
// ========================================================================

/// Binary arithmetic and bitwise operators.
///
/// Each operator carries its own signedness and overflow behavior, so `div` and `div.un` are
/// distinct operators rather than one operator with a type-dependent meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "+.ovf")]
    AddOvf,
    #[strum(serialize = "+.ovf.un")]
    AddOvfUn,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "-.ovf")]
    SubOvf,
    #[strum(serialize = "-.ovf.un")]
    SubOvfUn,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "*.ovf")]
    MulOvf,
    #[strum(serialize = "*.ovf.un")]
    MulOvfUn,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "/.un")]
    DivUn,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "%.un")]
    RemUn,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "^")]
    Xor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = ">>.un")]
    ShrUn,
}

impl BinaryOp {
    /// The operator implemented by an arithmetic or bitwise opcode.
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        Some(match opcode {
            Opcode::Add => BinaryOp::Add,
            Opcode::AddOvf => BinaryOp::AddOvf,
            Opcode::AddOvfUn => BinaryOp::AddOvfUn,
            Opcode::Sub => BinaryOp::Sub,
            Opcode::SubOvf => BinaryOp::SubOvf,
            Opcode::SubOvfUn => BinaryOp::SubOvfUn,
            Opcode::Mul => BinaryOp::Mul,
            Opcode::MulOvf => BinaryOp::MulOvf,
            Opcode::MulOvfUn => BinaryOp::MulOvfUn,
            Opcode::Div => BinaryOp::Div,
            Opcode::DivUn => BinaryOp::DivUn,
            Opcode::Rem => BinaryOp::Rem,
            Opcode::RemUn => BinaryOp::RemUn,
            Opcode::And => BinaryOp::And,
            Opcode::Or => BinaryOp::Or,
            Opcode::Xor => BinaryOp::Xor,
            Opcode::Shl => BinaryOp::Shl,
            Opcode::Shr => BinaryOp::Shr,
            Opcode::ShrUn => BinaryOp::ShrUn,
            _ => return None,
        })
    }

    /// Returns `true` for operators that trap on overflow.
    #[must_use]
    pub const fn is_checked(self) -> bool {
        matches!(
            self,
            BinaryOp::AddOvf
                | BinaryOp::AddOvfUn
                | BinaryOp::SubOvf
                | BinaryOp::SubOvfUn
                | BinaryOp::MulOvf
                | BinaryOp::MulOvfUn
        )
    }

    /// Returns `true` for `and`, `or` and `xor`.
    #[must_use]
    pub const fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    /// Returns `true` for the shift operators.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrUn)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "~")]
    Not,
}

/// Comparison operators, used by `ceq`-style expressions and conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

/// Type test and boxing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TypeOp {
    Castclass,
    Isinst,
    Box,
    Unbox,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
}

// ========================================================================
// Calls
// ========================================================================

/// What a call invokes.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// A method resolved from a token
    Method(Member),
    /// A function pointer with its call site signature, from `calli`
    Indirect { pointer: Value, signature: Member },
    /// A runtime service without a method token, named by the opcode requesting it
    Intrinsic(Opcode),
}

/// A method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub target: CallTarget,
    /// Arguments in declaration order, `this` first
    pub args: Vec<Value>,
    /// Dispatched through the virtual table (`callvirt`)
    pub virtual_call: bool,
    /// Marked with the `tail.` prefix
    pub tail: bool,
    /// Type named by a preceding `constrained.` prefix
    pub constrained: Option<TacType>,
}

impl CallExpr {
    /// A plain call of `target` with `args`.
    #[must_use]
    pub fn new(target: CallTarget, args: Vec<Value>) -> Self {
        CallExpr {
            target,
            args,
            virtual_call: false,
            tail: false,
            constrained: None,
        }
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tail {
            write!(f, "tail ")?;
        }
        if let Some(ty) = &self.constrained {
            write!(f, "constrained({ty}) ")?;
        }
        if self.virtual_call {
            write!(f, "virtual ")?;
        }
        match &self.target {
            CallTarget::Method(member) => write!(f, "{member}")?,
            CallTarget::Indirect { pointer, signature } => write!(f, "({signature}){pointer}")?,
            CallTarget::Intrinsic(opcode) => write!(f, "__{}", opcode.mnemonic())?,
        }
        write!(f, "(")?;
        write_list(f, &self.args)?;
        write!(f, ")")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

// ========================================================================
// Expressions and places
// ========================================================================

/// The right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Copy of a value
    Value(Value),
    Binary {
        op: BinaryOp,
        left: Value,
        right: Value,
    },
    Unary {
        op: UnaryOp,
        operand: Value,
    },
    /// Comparison producing `1` or `0`
    Compare {
        op: CompareOp,
        unsigned: bool,
        left: Value,
        right: Value,
    },
    Convert {
        to: TacType,
        checked: bool,
        unsigned: bool,
        operand: Value,
    },
    Call(CallExpr),
    /// Object construction through `newobj`
    New {
        ctor: Member,
        args: Vec<Value>,
    },
    NewArray {
        element: TacType,
        length: Value,
    },
    Field {
        object: Option<Value>,
        field: Member,
    },
    FieldAddress {
        object: Option<Value>,
        field: Member,
    },
    Element {
        array: Value,
        index: Value,
        ty: TacType,
    },
    ElementAddress {
        array: Value,
        index: Value,
        ty: TacType,
    },
    ArrayLength(Value),
    /// Load through a pointer
    Indirect {
        address: Value,
        ty: TacType,
    },
    /// Address of a local or parameter
    AddressOf(Value),
    TypeOp {
        op: TypeOp,
        ty: TacType,
        operand: Value,
    },
    /// `ldftn` without an object, `ldvirtftn` with one
    FunctionPointer {
        method: Member,
        object: Option<Value>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value(value) => write!(f, "{value}"),
            Expr::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Compare {
                op,
                unsigned,
                left,
                right,
            } => {
                let suffix = if *unsigned { ".un" } else { "" };
                write!(f, "{left} {op}{suffix} {right}")
            }
            Expr::Convert {
                to,
                checked,
                unsigned,
                operand,
            } => {
                write!(f, "({to}")?;
                if *checked {
                    write!(f, " checked")?;
                }
                if *unsigned {
                    write!(f, " unsigned")?;
                }
                write!(f, ") {operand}")
            }
            Expr::Call(call) => write!(f, "{call}"),
            Expr::New { ctor, args } => {
                write!(f, "new {ctor}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::NewArray { element, length } => write!(f, "new {element}[{length}]"),
            Expr::Field { object, field } => match object {
                Some(object) => write!(f, "{object}.{field}"),
                None => write!(f, "{field}"),
            },
            Expr::FieldAddress { object, field } => match object {
                Some(object) => write!(f, "&{object}.{field}"),
                None => write!(f, "&{field}"),
            },
            Expr::Element { array, index, .. } => write!(f, "{array}[{index}]"),
            Expr::ElementAddress { array, index, .. } => write!(f, "&{array}[{index}]"),
            Expr::ArrayLength(array) => write!(f, "{array}.length"),
            Expr::Indirect { address, ty } => write!(f, "*({ty}*){address}"),
            Expr::AddressOf(value) => write!(f, "&{value}"),
            Expr::TypeOp { op, ty, operand } => write!(f, "{op}({ty}) {operand}"),
            Expr::FunctionPointer { method, object } => match object {
                Some(object) => write!(f, "&{object}.{method}"),
                None => write!(f, "&{method}"),
            },
        }
    }
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Local(u16),
    Param(u16),
    Temp(VarId),
    Field {
        object: Option<Value>,
        field: Member,
    },
    Element {
        array: Value,
        index: Value,
        ty: TacType,
    },
    Indirect {
        address: Value,
        ty: TacType,
    },
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Local(slot) => write!(f, "loc{slot}"),
            Place::Param(slot) => write!(f, "arg{slot}"),
            Place::Temp(id) => write!(f, "t{}", id.0),
            Place::Field { object, field } => match object {
                Some(object) => write!(f, "{object}.{field}"),
                None => write!(f, "{field}"),
            },
            Place::Element { array, index, .. } => write!(f, "{array}[{index}]"),
            Place::Indirect { address, ty } => write!(f, "*({ty}*){address}"),
        }
    }
}

// ========================================================================
// Statements
// ========================================================================

/// Condition of a conditional jump.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `brtrue`
    True(Value),
    /// `brfalse`
    False(Value),
    Compare {
        op: CompareOp,
        unsigned: bool,
        left: Value,
        right: Value,
    },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True(value) => write!(f, "{value}"),
            Condition::False(value) => write!(f, "!{value}"),
            Condition::Compare {
                op,
                unsigned,
                left,
                right,
            } => {
                let suffix = if *unsigned { ".un" } else { "" };
                write!(f, "{left} {op}{suffix} {right}")
            }
        }
    }
}

/// Exception handling pseudo-statements.
#[derive(Debug, Clone, PartialEq)]
pub enum EhStatement {
    /// Exit of a protected region or handler towards the given line
    Leave(usize),
    /// End of a `finally` or `fault` handler
    EndFinally,
    /// End of a `finally` body that is only reached without a pending exit
    InertEndFinally,
    /// End of a filter predicate with its verdict
    EndFilter(Value),
    Throw(Value),
    Rethrow,
}

/// One line of translated code.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { dest: Place, expr: Expr },
    /// Call evaluated for its side effects only
    Call(CallExpr),
    Return(Option<Value>),
    Goto(usize),
    If { cond: Condition, target: usize },
    Eh(EhStatement),
}

impl Statement {
    /// Line this statement can jump to.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        match self {
            Statement::Goto(target)
            | Statement::If { target, .. }
            | Statement::Eh(EhStatement::Leave(target)) => Some(*target),
            _ => None,
        }
    }

    /// Rewrites the jump target, if any, through `map`.
    pub fn retarget(&mut self, map: impl FnOnce(usize) -> usize) {
        match self {
            Statement::Goto(target)
            | Statement::If { target, .. }
            | Statement::Eh(EhStatement::Leave(target)) => *target = map(*target),
            _ => {}
        }
    }

    /// Returns `true` for a `leave` pseudo-statement.
    #[must_use]
    pub fn is_leave(&self) -> bool {
        matches!(self, Statement::Eh(EhStatement::Leave(_)))
    }

    /// Returns `true` for a live `endfinally`.
    #[must_use]
    pub fn is_end_finally(&self) -> bool {
        matches!(self, Statement::Eh(EhStatement::EndFinally))
    }

    /// Returns `true` if control never continues with the next line.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Statement::Return(_)
                | Statement::Goto(_)
                | Statement::Eh(
                    EhStatement::Leave(_)
                        | EhStatement::EndFinally
                        | EhStatement::InertEndFinally
                        | EhStatement::EndFilter(_)
                        | EhStatement::Throw(_)
                        | EhStatement::Rethrow
                )
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { dest, expr } => write!(f, "{dest} = {expr}"),
            Statement::Call(call) => write!(f, "{call}"),
            Statement::Return(Some(value)) => write!(f, "return {value}"),
            Statement::Return(None) => write!(f, "return"),
            Statement::Goto(target) => write!(f, "goto {target}"),
            Statement::If { cond, target } => write!(f, "if {cond} goto {target}"),
            Statement::Eh(EhStatement::Leave(target)) => write!(f, "leave {target}"),
            Statement::Eh(EhStatement::EndFinally) => write!(f, "endfinally"),
            Statement::Eh(EhStatement::InertEndFinally) => write!(f, "endfinally (inert)"),
            Statement::Eh(EhStatement::EndFilter(value)) => write!(f, "endfilter {value}"),
            Statement::Eh(EhStatement::Throw(value)) => write!(f, "throw {value}"),
            Statement::Eh(EhStatement::Rethrow) => write!(f, "rethrow"),
        }
    }
}
