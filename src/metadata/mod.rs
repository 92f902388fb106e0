//! The metadata contracts the translation pipeline depends on.
//!
//! The pipeline does not read assemblies. It consumes method bodies and resolves token
//! operands through collaborators defined here:
//!
//! - [`token`] - metadata tokens found in instruction operands
//! - [`typesystem`] - the [`typesystem::TacType`] model and the [`typesystem::TypeJoin`] operation
//! - [`members`] - resolved method, field and signature shapes
//! - [`resolver`] - the [`resolver::MemberResolver`] trait and its in-memory and caching implementations
//! - [`method`] - method headers, exception clauses and [`method::MethodDescriptor`]

pub mod members;
pub mod method;
pub mod resolver;
pub mod token;
pub mod typesystem;
