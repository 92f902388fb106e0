//! Least common supertype computation for merge placeholders.
//!
//! When two control flow paths push different values into the same stack slot, the translator
//! creates a merge placeholder whose type is the join of the incoming types. The join is
//! delegated to a [`TypeJoin`] implementation so that callers with a full type system can plug
//! in exact answers; [`TypeHierarchy`] is a self-contained implementation working on
//! registered class names.
//!
//! # Join rules
//!
//! | Inputs                                  | Result                               |
//! |-----------------------------------------|--------------------------------------|
//! | identical types                         | that type                            |
//! | unknown and `T`                         | `T`                                  |
//! | `null` and reference type `T`           | `T`                                  |
//! | primitives with the same stack type     | the stack type                       |
//! | int32 and native int                    | native int                           |
//! | two reference types                     | nearest common base, else a shared interface, else object |
//! | two vectors of references, same rank    | array of the joined element types    |
//! | two unmanaged pointers                  | native int                           |
//! | anything else                           | [`crate::Error::IncompatibleMerge`]  |

use std::collections::HashSet;

use dashmap::DashMap;

use crate::{
    metadata::typesystem::{TacType, OBJECT_TYPE},
    Error, Result,
};

/// Upper bound on base class chains, guarding against cyclic registrations.
const MAX_HIERARCHY_DEPTH: usize = 256;

/// Computes the least common supertype of two types.
///
/// Implementations must be safe for concurrent use, since methods may be translated in
/// parallel against a shared join.
pub trait TypeJoin: Send + Sync {
    /// Returns the least specific type both `a` and `b` are assignable to.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleMerge`] if the types have no common supertype.
    fn join(&self, a: &TacType, b: &TacType) -> Result<TacType>;
}

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    base: Option<String>,
    interfaces: Vec<String>,
}

/// A class hierarchy keyed by full type name.
///
/// Classes that were never registered are treated as direct subclasses of `System.Object`
/// implementing no interfaces. Registration is allowed concurrently with joins.
///
/// # Examples
///
/// ```rust
/// use ciltac::metadata::typesystem::{TacType, TypeHierarchy, TypeJoin};
///
/// let hierarchy = TypeHierarchy::new()
///     .with_class("System.IO.Stream", None, &["System.IDisposable"])
///     .with_class("System.IO.FileStream", Some("System.IO.Stream"), &[])
///     .with_class("System.IO.MemoryStream", Some("System.IO.Stream"), &[]);
///
/// let joined = hierarchy.join(
///     &TacType::class("System.IO.FileStream"),
///     &TacType::class("System.IO.MemoryStream"),
/// )?;
/// assert_eq!(joined, TacType::class("System.IO.Stream"));
/// # Ok::<(), ciltac::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    classes: DashMap<String, ClassInfo>,
}

impl TypeHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class or interface with its base class and directly implemented interfaces.
    ///
    /// Re-registering a name replaces the previous entry.
    pub fn register(&self, name: &str, base: Option<&str>, interfaces: &[&str]) {
        self.classes.insert(
            name.to_string(),
            ClassInfo {
                base: base.map(str::to_string),
                interfaces: interfaces.iter().map(|i| (*i).to_string()).collect(),
            },
        );
    }

    /// Builder-style variant of [`TypeHierarchy::register`].
    #[must_use]
    pub fn with_class(self, name: &str, base: Option<&str>, interfaces: &[&str]) -> Self {
        self.register(name, base, interfaces);
        self
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The base class chain of a reference type, starting with the type itself and always
    /// ending in `System.Object`.
    fn ancestry(&self, ty: &TacType) -> Vec<String> {
        let start = match ty {
            TacType::Array(_, _) => "System.Array",
            _ => match ty.full_name() {
                Some(name) => name,
                None => OBJECT_TYPE,
            },
        };

        let mut chain = Vec::new();
        let mut current = Some(start.to_string());
        while let Some(name) = current {
            if name == OBJECT_TYPE || chain.contains(&name) || chain.len() >= MAX_HIERARCHY_DEPTH
            {
                break;
            }
            current = self
                .classes
                .get(&name)
                .and_then(|info| info.base.clone());
            chain.push(name);
        }
        chain.push(OBJECT_TYPE.to_string());
        chain
    }

    /// All interfaces implemented along `chain`, including interfaces inherited by interfaces,
    /// in discovery order.
    fn interfaces(&self, chain: &[String]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut pending: Vec<String> = chain
            .iter()
            .filter_map(|name| self.classes.get(name))
            .flat_map(|info| info.interfaces.clone())
            .collect();
        pending.reverse();

        while let Some(interface) = pending.pop() {
            if found.contains(&interface) || found.len() >= MAX_HIERARCHY_DEPTH {
                continue;
            }
            if let Some(info) = self.classes.get(&interface) {
                pending.extend(info.interfaces.iter().rev().cloned());
            }
            found.push(interface);
        }
        found
    }

    fn join_references(&self, a: &TacType, b: &TacType) -> Result<TacType> {
        if let (TacType::Array(elem_a, rank_a), TacType::Array(elem_b, rank_b)) = (a, b) {
            if rank_a == rank_b && elem_a.is_reference() && elem_b.is_reference() {
                let element = self.join(elem_a, elem_b)?;
                return Ok(TacType::Array(Box::new(element), *rank_a));
            }
        }

        let chain_a = self.ancestry(a);
        let chain_b = self.ancestry(b);
        let interfaces_a = self.interfaces(&chain_a);
        let interfaces_b = self.interfaces(&chain_b);
        let reachable_b: HashSet<&String> = chain_b.iter().chain(interfaces_b.iter()).collect();

        if let Some(common) = chain_a
            .iter()
            .chain(interfaces_a.iter())
            .find(|name| name.as_str() != OBJECT_TYPE && reachable_b.contains(name))
        {
            return Ok(TacType::class(common.as_str()));
        }

        Ok(TacType::Object)
    }
}

impl TypeJoin for TypeHierarchy {
    fn join(&self, a: &TacType, b: &TacType) -> Result<TacType> {
        if a == b {
            return Ok(a.clone());
        }

        match (a, b) {
            (TacType::Unknown, other) | (other, TacType::Unknown) => return Ok(other.clone()),
            (TacType::Null, other) | (other, TacType::Null) if other.is_reference() => {
                return Ok(other.clone())
            }
            _ => {}
        }

        let (stack_a, stack_b) = (a.stack_type(), b.stack_type());
        if stack_a == stack_b && stack_a.is_primitive() {
            return Ok(stack_a);
        }

        match (&stack_a, &stack_b) {
            (TacType::I32, TacType::NativeInt) | (TacType::NativeInt, TacType::I32) => {
                Ok(TacType::NativeInt)
            }
            (TacType::Pointer(_), TacType::Pointer(_))
            | (TacType::Pointer(_), TacType::NativeInt)
            | (TacType::NativeInt, TacType::Pointer(_)) => Ok(TacType::NativeInt),
            _ if a.is_reference() && b.is_reference() => self.join_references(a, b),
            _ => Err(Error::IncompatibleMerge(format!(
                "no common supertype for {a} and {b}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams() -> TypeHierarchy {
        TypeHierarchy::new()
            .with_class("System.IDisposable", None, &[])
            .with_class("System.IAsyncDisposable", None, &[])
            .with_class(
                "System.IO.Stream",
                None,
                &["System.IDisposable", "System.IAsyncDisposable"],
            )
            .with_class("System.IO.FileStream", Some("System.IO.Stream"), &[])
            .with_class("System.IO.MemoryStream", Some("System.IO.Stream"), &[])
            .with_class("System.IO.TextReader", None, &["System.IDisposable"])
            .with_class("System.IO.StreamReader", Some("System.IO.TextReader"), &[])
    }

    #[test]
    fn identical_and_unknown() {
        let h = TypeHierarchy::new();
        assert_eq!(h.join(&TacType::I64, &TacType::I64).unwrap(), TacType::I64);
        assert_eq!(
            h.join(&TacType::Unknown, &TacType::String).unwrap(),
            TacType::String
        );
        assert_eq!(
            h.join(&TacType::F32, &TacType::Unknown).unwrap(),
            TacType::F32
        );
    }

    #[test]
    fn null_joins_with_references() {
        let h = TypeHierarchy::new();
        assert_eq!(
            h.join(&TacType::Null, &TacType::String).unwrap(),
            TacType::String
        );
        let array = TacType::vector(TacType::I32);
        assert_eq!(h.join(&array, &TacType::Null).unwrap(), array);
        assert!(matches!(
            h.join(&TacType::Null, &TacType::I32),
            Err(Error::IncompatibleMerge(_))
        ));
    }

    #[test]
    fn primitives_join_on_stack_type() {
        let h = TypeHierarchy::new();
        assert_eq!(h.join(&TacType::Bool, &TacType::I32).unwrap(), TacType::I32);
        assert_eq!(h.join(&TacType::U8, &TacType::I16).unwrap(), TacType::I32);
        assert_eq!(h.join(&TacType::F32, &TacType::F64).unwrap(), TacType::F64);
        assert_eq!(
            h.join(&TacType::I32, &TacType::NativeUInt).unwrap(),
            TacType::NativeInt
        );
        assert!(h.join(&TacType::I32, &TacType::I64).is_err());
        assert!(h.join(&TacType::F64, &TacType::I64).is_err());
    }

    #[test]
    fn nearest_common_base() {
        let h = streams();
        assert_eq!(
            h.join(
                &TacType::class("System.IO.FileStream"),
                &TacType::class("System.IO.MemoryStream")
            )
            .unwrap(),
            TacType::class("System.IO.Stream")
        );
        assert_eq!(
            h.join(
                &TacType::class("System.IO.Stream"),
                &TacType::class("System.IO.FileStream")
            )
            .unwrap(),
            TacType::class("System.IO.Stream")
        );
    }

    #[test]
    fn shared_interface() {
        let h = streams();
        assert_eq!(
            h.join(
                &TacType::class("System.IO.FileStream"),
                &TacType::class("System.IO.StreamReader")
            )
            .unwrap(),
            TacType::class("System.IDisposable")
        );
        assert_eq!(
            h.join(
                &TacType::class("System.IDisposable"),
                &TacType::class("System.IO.MemoryStream")
            )
            .unwrap(),
            TacType::class("System.IDisposable")
        );
    }

    #[test]
    fn unrelated_references_join_to_object() {
        let h = streams();
        assert_eq!(
            h.join(&TacType::String, &TacType::class("System.IO.FileStream"))
                .unwrap(),
            TacType::Object
        );
        assert_eq!(
            h.join(&TacType::class("A"), &TacType::class("B")).unwrap(),
            TacType::Object
        );
    }

    #[test]
    fn arrays() {
        let h = streams();
        let files = TacType::vector(TacType::class("System.IO.FileStream"));
        let memories = TacType::vector(TacType::class("System.IO.MemoryStream"));
        assert_eq!(
            h.join(&files, &memories).unwrap(),
            TacType::vector(TacType::class("System.IO.Stream"))
        );
        assert_eq!(
            h.join(&TacType::vector(TacType::I32), &TacType::vector(TacType::I64))
                .unwrap(),
            TacType::class("System.Array")
        );
    }

    #[test]
    fn unrelated_value_types_fail() {
        let h = TypeHierarchy::new();
        let result = h.join(
            &TacType::value_type("System.Guid"),
            &TacType::value_type("System.DateTime"),
        );
        assert!(matches!(result, Err(Error::IncompatibleMerge(_))));
        assert!(h
            .join(&TacType::value_type("System.Guid"), &TacType::Object)
            .is_err());
    }

    #[test]
    fn cyclic_registration_terminates() {
        let h = TypeHierarchy::new()
            .with_class("A", Some("B"), &["I"])
            .with_class("B", Some("A"), &[])
            .with_class("I", None, &["I"]);
        assert_eq!(h.len(), 3);
        assert_eq!(
            h.join(&TacType::class("A"), &TacType::class("C")).unwrap(),
            TacType::Object
        );
        assert_eq!(
            h.join(&TacType::class("B"), &TacType::class("A")).unwrap(),
            TacType::class("B")
        );
    }
}
