//! Types of translated values and their join.
//!
//! - [`TacType`] - the type model carried by every TAC variable
//! - [`TypeJoin`] - the least common supertype operation used to type merge placeholders
//! - [`TypeHierarchy`] - a [`TypeJoin`] over registered class names

mod join;
mod types;

pub use join::{TypeHierarchy, TypeJoin};
pub use types::{TacType, EXCEPTION_TYPE, OBJECT_TYPE};
