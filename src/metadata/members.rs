//! Resolved members referenced by instruction operands.
//!
//! A [`crate::metadata::resolver::MemberResolver`] turns the metadata token of a `call`,
//! `ldfld`, `ldstr` or similar instruction into one of the shapes defined here. The shapes are
//! deliberately small: the translator only needs to know how many values a call consumes,
//! whether it produces one, and what the types involved are.

use std::{fmt, sync::Arc};

use crate::metadata::{token::Token, typesystem::TacType};

/// Resolved shape of a method reference.
///
/// Used for `call`, `callvirt`, `newobj`, `jmp`, `ldftn` and `ldvirtftn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    /// Simple name of the method, e.g. `WriteLine` or `.ctor`
    pub name: String,
    /// The type declaring the method
    pub declaring_type: TacType,
    /// Declared parameter types, excluding the implicit `this`
    pub params: Vec<TacType>,
    /// Declared return type, [`TacType::Void`] if none
    pub return_type: TacType,
    /// `true` for instance methods, which take `this` as an extra first argument
    pub has_this: bool,
}

impl MethodSig {
    /// Creates a static method signature.
    #[must_use]
    pub fn new_static(
        declaring_type: TacType,
        name: impl Into<String>,
        params: Vec<TacType>,
        return_type: TacType,
    ) -> Self {
        MethodSig {
            name: name.into(),
            declaring_type,
            params,
            return_type,
            has_this: false,
        }
    }

    /// Creates an instance method signature.
    #[must_use]
    pub fn new_instance(
        declaring_type: TacType,
        name: impl Into<String>,
        params: Vec<TacType>,
        return_type: TacType,
    ) -> Self {
        MethodSig {
            has_this: true,
            ..Self::new_static(declaring_type, name, params, return_type)
        }
    }

    /// Number of stack values consumed by a call, including `this`.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Returns `true` if a call produces a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

/// Resolved shape of a field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSig {
    /// Simple name of the field
    pub name: String,
    /// The type declaring the field
    pub declaring_type: TacType,
    /// Type of the field
    pub field_type: TacType,
    /// `true` for static fields
    pub is_static: bool,
}

/// Resolved standalone signature, as used by `calli`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteSig {
    /// Parameter types, excluding the implicit `this`
    pub params: Vec<TacType>,
    /// Return type, [`TacType::Void`] if none
    pub return_type: TacType,
    /// `true` if the callee takes `this` as an extra first argument
    pub has_this: bool,
}

impl CallSiteSig {
    /// Number of stack values consumed by the call, excluding the function pointer.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }
}

/// A token operand after resolution.
///
/// Resolution failures never abort translation: the decoder records them as
/// [`Member::Unknown`] and the translator degrades to [`TacType::Unknown`] where it can.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// A type, for `newarr`, `box`, `castclass`, `ldtoken` and friends
    Type(Arc<TacType>),
    /// A method, for the call family
    Method(Arc<MethodSig>),
    /// A field, for the `ld*fld*` and `st*fld` family
    Field(Arc<FieldSig>),
    /// A user string, for `ldstr`
    String(Arc<str>),
    /// A standalone call site signature, for `calli`
    Signature(Arc<CallSiteSig>),
    /// A token the resolver could not resolve
    Unknown(Token),
}

impl Member {
    /// Returns the type, or [`TacType::Unknown`] if this is not a resolved type.
    #[must_use]
    pub fn as_type(&self) -> TacType {
        match self {
            Member::Type(ty) => (**ty).clone(),
            _ => TacType::Unknown,
        }
    }

    /// Returns the method signature, if this is a resolved method.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodSig> {
        match self {
            Member::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Returns the field signature, if this is a resolved field.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldSig> {
        match self {
            Member::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns `true` if resolution failed.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Member::Unknown(_))
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Type(ty) => write!(f, "{ty}"),
            Member::Method(method) => {
                let declaring = method.declaring_type.full_name().unwrap_or("?");
                write!(f, "{declaring}::{}(", method.name)?;
                for (index, param) in method.params.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")")
            }
            Member::Field(field) => {
                let declaring = field.declaring_type.full_name().unwrap_or("?");
                write!(f, "{declaring}::{}", field.name)
            }
            Member::String(value) => write!(f, "{value:?}"),
            Member::Signature(sig) => {
                write!(f, "{} *(", sig.return_type)?;
                for (index, param) in sig.params.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")")
            }
            Member::Unknown(token) => write!(f, "<unresolved {token}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_arity() {
        let concat = MethodSig::new_static(
            TacType::String,
            "Concat",
            vec![TacType::String, TacType::String],
            TacType::String,
        );
        assert_eq!(concat.arity(), 2);
        assert!(concat.returns_value());

        let dispose = MethodSig::new_instance(
            TacType::class("System.IDisposable"),
            "Dispose",
            vec![],
            TacType::Void,
        );
        assert_eq!(dispose.arity(), 1);
        assert!(!dispose.returns_value());
    }

    #[test]
    fn display() {
        let method = Member::Method(Arc::new(MethodSig::new_static(
            TacType::class("System.Console"),
            "WriteLine",
            vec![TacType::String],
            TacType::Void,
        )));
        assert_eq!(method.to_string(), "System.Console::WriteLine(string)");

        let field = Member::Field(Arc::new(FieldSig {
            name: "Empty".into(),
            declaring_type: TacType::String,
            field_type: TacType::String,
            is_static: true,
        }));
        assert_eq!(field.to_string(), "System.String::Empty");
        assert_eq!(Member::String(Arc::from("hi")).to_string(), "\"hi\"");
        assert_eq!(
            Member::Unknown(Token::new(0x0A00_0001)).to_string(),
            "<unresolved 0x0a000001>"
        );
    }

    #[test]
    fn accessors() {
        let ty = Member::Type(Arc::new(TacType::I32));
        assert_eq!(ty.as_type(), TacType::I32);
        assert!(ty.as_method().is_none());
        let unknown = Member::Unknown(Token::new(1));
        assert!(unknown.is_unknown());
        assert_eq!(unknown.as_type(), TacType::Unknown);
        assert!(unknown.as_field().is_none());
    }
}
