//! Method bodies and the descriptors handed to the translation pipeline.
//!
//! - [`MethodBody`] - tiny/fat header and exception section parsing
//! - [`ExceptionHandler`] - raw exception handling clauses in byte offsets
//! - [`MethodDescriptor`] - a method's signature, locals, code and clauses

mod body;
mod descriptor;
mod exceptions;
mod types;

pub use body::MethodBody;
pub use descriptor::MethodDescriptor;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::{MethodBodyFlags, SectionFlags, METHOD_HEADER_FORMAT_MASK};
