//! The type model attached to TAC values.
//!
//! [`TacType`] captures what the translator needs to know about a value: enough to pick the
//! semantics of an operation, to type temporaries, and to compute the join at control flow
//! merges. Class and value types are identified by their full name, which is what a member
//! resolver naturally provides and what a [`crate::metadata::typesystem::TypeJoin`]
//! implementation keys its hierarchy on.

use std::fmt;

/// Full name of the root of the class hierarchy.
pub const OBJECT_TYPE: &str = "System.Object";

/// Full name of the generic exception type.
pub const EXCEPTION_TYPE: &str = "System.Exception";

/// Type of a value flowing through the translated method.
///
/// # Examples
///
/// ```rust
/// use ciltac::metadata::typesystem::TacType;
///
/// let short = TacType::I16;
/// assert_eq!(short.stack_type(), TacType::I32);
///
/// let list = TacType::class("System.Collections.ArrayList");
/// assert!(list.is_reference());
/// assert_eq!(list.to_string(), "class System.Collections.ArrayList");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TacType {
    // ========== Primitives ==========
    /// No value (void).
    Void,

    /// Boolean type (System.Boolean).
    Bool,

    /// Unicode character (System.Char).
    Char,

    /// Signed 8-bit integer (System.SByte).
    I8,

    /// Unsigned 8-bit integer (System.Byte).
    U8,

    /// Signed 16-bit integer (System.Int16).
    I16,

    /// Unsigned 16-bit integer (System.UInt16).
    U16,

    /// Signed 32-bit integer (System.Int32).
    I32,

    /// Unsigned 32-bit integer (System.UInt32).
    U32,

    /// Signed 64-bit integer (System.Int64).
    I64,

    /// Unsigned 64-bit integer (System.UInt64).
    U64,

    /// Native-sized signed integer (System.IntPtr).
    NativeInt,

    /// Native-sized unsigned integer (System.UIntPtr).
    NativeUInt,

    /// 32-bit floating point (System.Single).
    F32,

    /// 64-bit floating point (System.Double).
    F64,

    // ========== Reference Types ==========
    /// System.Object reference.
    Object,

    /// System.String reference.
    String,

    /// Reference to a class or interface, by full name.
    Class(String),

    /// Value type (struct or enum), by full name.
    ValueType(String),

    /// Array with element type and rank. Rank 1 is a vector.
    Array(Box<TacType>, u32),

    // ========== Pointers ==========
    /// Unmanaged pointer.
    Pointer(Box<TacType>),

    /// Managed reference.
    ByRef(Box<TacType>),

    // ========== Special Types ==========
    /// Typed reference (System.TypedReference).
    TypedReference,

    /// Generic type parameter (`!n`).
    GenericParam(u32),

    /// Generic method parameter (`!!n`).
    MethodGenericParam(u32),

    /// Function pointer, as produced by `ldftn`.
    FnPtr,

    /// The type of the `null` literal, assignable to every reference type.
    Null,

    /// Type that could not be determined, typically from an unresolved member.
    #[default]
    Unknown,
}

impl TacType {
    /// Creates a class type from its full name.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            OBJECT_TYPE => TacType::Object,
            "System.String" => TacType::String,
            _ => TacType::Class(name),
        }
    }

    /// Creates a value type from its full name.
    #[must_use]
    pub fn value_type(name: impl Into<String>) -> Self {
        TacType::ValueType(name.into())
    }

    /// Creates a single-dimensional array of `element`.
    #[must_use]
    pub fn vector(element: TacType) -> Self {
        TacType::Array(Box::new(element), 1)
    }

    /// Creates a managed reference to `target`.
    #[must_use]
    pub fn by_ref(target: TacType) -> Self {
        TacType::ByRef(Box::new(target))
    }

    /// The type given to caught exceptions when the clause names none.
    #[must_use]
    pub fn exception() -> Self {
        TacType::Class(EXCEPTION_TYPE.to_string())
    }

    /// Returns `true` if this is a primitive numeric, character or boolean type.
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
                | Self::NativeInt
                | Self::NativeUInt
                | Self::F32
                | Self::F64
        )
    }

    /// Returns `true` if this is an integer type (signed or unsigned).
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
                | Self::NativeInt
                | Self::NativeUInt
        )
    }

    /// Returns `true` if this is a floating-point type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns `true` if values of this type are object references (can be null).
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Object | Self::String | Self::Class(_) | Self::Array(_, _) | Self::Null
        )
    }

    /// Returns `true` if this is a value type (struct, enum or primitive).
    #[must_use]
    pub const fn is_value_type(&self) -> bool {
        matches!(self, Self::ValueType(_) | Self::TypedReference) || self.is_primitive()
    }

    /// Returns `true` for managed and unmanaged pointers.
    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_) | Self::ByRef(_))
    }

    /// Returns `true` if this is the void type.
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Returns `true` if this type is unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns the element type if this is an array.
    #[must_use]
    pub fn element_type(&self) -> Option<&TacType> {
        match self {
            Self::Array(element, _) => Some(element),
            _ => None,
        }
    }

    /// Returns the pointed-to type if this is a pointer or byref.
    #[must_use]
    pub fn pointee_type(&self) -> Option<&TacType> {
        match self {
            Self::Pointer(inner) | Self::ByRef(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the full name of a class-like type, as used by type hierarchies.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        match self {
            Self::Object => Some(OBJECT_TYPE),
            Self::String => Some("System.String"),
            Self::Class(name) | Self::ValueType(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the type this value has on the evaluation stack.
    ///
    /// CIL normalizes values on the stack (ECMA-335 Partition III, 1.1): integers narrower than
    /// 32 bits and `bool`/`char` widen to int32, unsigned integers share the representation of
    /// their signed counterparts, and both float types become the internal `F` type, modelled
    /// here as float64. References, pointers and value types are unchanged.
    #[must_use]
    pub fn stack_type(&self) -> TacType {
        match self {
            Self::Bool
            | Self::Char
            | Self::I8
            | Self::U8
            | Self::I16
            | Self::U16
            | Self::I32
            | Self::U32 => Self::I32,
            Self::I64 | Self::U64 => Self::I64,
            Self::NativeInt | Self::NativeUInt | Self::FnPtr => Self::NativeInt,
            Self::F32 | Self::F64 => Self::F64,
            _ => self.clone(),
        }
    }
}

impl fmt::Display for TacType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "bool"),
            Self::Char => write!(f, "char"),
            Self::I8 => write!(f, "int8"),
            Self::U8 => write!(f, "uint8"),
            Self::I16 => write!(f, "int16"),
            Self::U16 => write!(f, "uint16"),
            Self::I32 => write!(f, "int32"),
            Self::U32 => write!(f, "uint32"),
            Self::I64 => write!(f, "int64"),
            Self::U64 => write!(f, "uint64"),
            Self::NativeInt => write!(f, "native int"),
            Self::NativeUInt => write!(f, "native uint"),
            Self::F32 => write!(f, "float32"),
            Self::F64 => write!(f, "float64"),
            Self::Object => write!(f, "object"),
            Self::String => write!(f, "string"),
            Self::Class(name) => write!(f, "class {name}"),
            Self::ValueType(name) => write!(f, "valuetype {name}"),
            Self::Array(element, 1) => write!(f, "{element}[]"),
            Self::Array(element, rank) => {
                write!(f, "{element}[")?;
                for _ in 1..*rank {
                    write!(f, ",")?;
                }
                write!(f, "]")
            }
            Self::Pointer(inner) => write!(f, "{inner}*"),
            Self::ByRef(inner) => write!(f, "{inner}&"),
            Self::TypedReference => write!(f, "typedref"),
            Self::GenericParam(index) => write!(f, "!{index}"),
            Self::MethodGenericParam(index) => write!(f, "!!{index}"),
            Self::FnPtr => write!(f, "method*"),
            Self::Null => write!(f, "null"),
            Self::Unknown => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_normalize_well_known_names() {
        assert_eq!(TacType::class("System.Object"), TacType::Object);
        assert_eq!(TacType::class("System.String"), TacType::String);
        assert_eq!(
            TacType::class("System.IO.Stream"),
            TacType::Class("System.IO.Stream".into())
        );
        assert_eq!(TacType::exception().full_name(), Some(EXCEPTION_TYPE));
    }

    #[test]
    fn categories() {
        assert!(TacType::I32.is_primitive());
        assert!(TacType::U64.is_integer());
        assert!(!TacType::F32.is_integer());
        assert!(TacType::F32.is_float());
        assert!(TacType::Null.is_reference());
        assert!(TacType::vector(TacType::I32).is_reference());
        assert!(TacType::value_type("System.Guid").is_value_type());
        assert!(!TacType::value_type("System.Guid").is_reference());
        assert!(TacType::by_ref(TacType::I32).is_pointer());
        assert!(TacType::Unknown.is_unknown());
        assert!(TacType::Void.is_void());
    }

    #[test]
    fn stack_normalization() {
        assert_eq!(TacType::Bool.stack_type(), TacType::I32);
        assert_eq!(TacType::U8.stack_type(), TacType::I32);
        assert_eq!(TacType::U32.stack_type(), TacType::I32);
        assert_eq!(TacType::U64.stack_type(), TacType::I64);
        assert_eq!(TacType::NativeUInt.stack_type(), TacType::NativeInt);
        assert_eq!(TacType::F32.stack_type(), TacType::F64);
        assert_eq!(TacType::String.stack_type(), TacType::String);
        let guid = TacType::value_type("System.Guid");
        assert_eq!(guid.stack_type(), guid);
    }

    #[test]
    fn accessors() {
        let array = TacType::Array(Box::new(TacType::F64), 2);
        assert_eq!(array.element_type(), Some(&TacType::F64));
        assert_eq!(TacType::I32.element_type(), None);
        let ptr = TacType::Pointer(Box::new(TacType::U8));
        assert_eq!(ptr.pointee_type(), Some(&TacType::U8));
    }

    #[test]
    fn display() {
        assert_eq!(TacType::I32.to_string(), "int32");
        assert_eq!(TacType::vector(TacType::String).to_string(), "string[]");
        assert_eq!(
            TacType::Array(Box::new(TacType::I32), 3).to_string(),
            "int32[,,]"
        );
        assert_eq!(TacType::by_ref(TacType::I64).to_string(), "int64&");
        assert_eq!(TacType::MethodGenericParam(1).to_string(), "!!1");
        assert_eq!(
            TacType::value_type("System.Guid").to_string(),
            "valuetype System.Guid"
        );
    }
}
