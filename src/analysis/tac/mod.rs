//! Three-address code.
//!
//! A method body is translated by replaying its instructions against an abstract operand
//! stack. Every value-producing instruction becomes one assignment to a fresh temporary, so
//! each statement has at most one operator and its operands are plain [`Value`]s. Stack slots
//! that receive different values along different control flow paths are represented by merge
//! placeholders, recorded in [`TacMethod::merges`] together with the values flowing in.
//!
//! Statements are laid out in block order and address each other by line index. Exception
//! clauses are carried along as [`EhScope`]s in line coordinates; [`LineTransformer`] keeps
//! jump targets and scopes consistent while the statement list is edited, which is what
//! [`inline_finally`] relies on.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::{
//!     analysis::tac::{translate_method, Statement, TranslationConfig},
//!     assembly::InstructionEncoder,
//!     metadata::{
//!         method::MethodDescriptor, resolver::MemoryResolver, token::Token,
//!         typesystem::{TacType, TypeHierarchy},
//!     },
//! };
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_ldarg(0)?;
//! encoder.emit_branch("brfalse.s", "zero")?;
//! encoder.emit_ldc_i4(10)?;
//! encoder.emit_instruction("ret", None)?;
//! encoder.define_label("zero")?;
//! encoder.emit_ldc_i4(0)?;
//! encoder.emit_instruction("ret", None)?;
//! let (code, _) = encoder.finalize()?;
//!
//! let method = MethodDescriptor::new("Pick", Token::new(0x0600_0001))
//!     .with_params(vec![TacType::Bool])
//!     .with_return(TacType::I32)
//!     .with_code(code);
//! let tac = translate_method(
//!     &method,
//!     &MemoryResolver::new(),
//!     &TypeHierarchy::new(),
//!     &TranslationConfig::default(),
//! )?;
//!
//! assert_eq!(tac.statements[0].to_string(), "if !arg0 goto 2");
//! assert!(matches!(tac.statements[2], Statement::Return(Some(_))));
//! # Ok::<(), ciltac::Error>(())
//! ```

mod config;
mod finally;
mod lines;
mod method;
mod scope;
mod statement;
mod translator;
mod typing;
mod value;

pub use config::TranslationConfig;
pub use finally::{inline_finally, InlineStats};
pub use lines::LineTransformer;
pub use method::{translate_method, TacMethod};
pub use scope::EhScope;
pub use statement::{
    BinaryOp, CallExpr, CallTarget, CompareOp, Condition, EhStatement, Expr, Place, Statement,
    TypeOp, UnaryOp,
};
pub use translator::Merge;
pub use value::{Literal, Value, VarId, Variable, VariableKind};
