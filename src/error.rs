use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedStream {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedStream {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! graph_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::InconsistentBlockGraph(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every stage of the translation pipeline reports failures through this enum. With the single
/// exception of [`Error::UnresolvedMember`], every variant is fatal for the method being
/// translated, but never for a batch: see [`crate::analysis::translate_methods`].
///
/// # Error Categories
///
/// ## Decoding
/// - [`Error::MalformedStream`] - The instruction stream or method header is corrupt
/// - [`Error::OutOfBounds`] - A read past the end of a buffer was attempted
///
/// ## Exception regions and block graph
/// - [`Error::UnresolvableClause`] - An exception clause does not map onto instructions
/// - [`Error::InconsistentBlockGraph`] - The basic block partition violates its invariants
///
/// ## Translation
/// - [`Error::StackUnderflow`] - An instruction popped an empty abstract stack
/// - [`Error::OperandArityMismatch`] - Operand counts do not line up
/// - [`Error::IncompatibleMerge`] - Two unrelated value types meet at a join point
/// - [`Error::StackLimit`] - The abstract stack grew beyond the configured limit
///
/// ## Collaborators
/// - [`Error::UnresolvedMember`] - A metadata token could not be resolved (non-fatal)
/// - [`Error::InvalidEncoding`] - The instruction encoder rejected its input
/// - [`Error::MethodFailed`] - A method-level failure wrapped with the method's identity
///
/// # Examples
///
/// ```rust
/// use ciltac::Error;
///
/// let error = Error::StackUnderflow { offset: 0x12 };
/// assert!(error.is_fatal_for_method());
/// assert_eq!(error.to_string(), "Stack underflow at IL_0012");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream is damaged and could not be decoded.
    ///
    /// Raised when an operand would read past the buffer end, an opcode is unknown, a branch
    /// lands in the middle of an instruction, or a method header is inconsistent. The error
    /// includes the source location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed stream - {file}:{line}: {message}")]
    MalformedStream {
        /// The message to be printed for the MalformedStream error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    ///
    /// The decoder converts this into [`Error::MalformedStream`] so that callers only see it
    /// from the low-level [`crate::Parser`].
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// An exception handling clause could not be mapped onto the decoded instructions.
    ///
    /// Either a boundary offset does not start an instruction, or a resolved range ends
    /// before it begins.
    #[error("Unresolvable exception clause - {0}")]
    UnresolvableClause(String),

    /// The basic block graph violates one of its structural invariants.
    ///
    /// This indicates a defect in the decoder or in the exception region importer rather than
    /// a property of the input, and is fatal for the method.
    #[error("Inconsistent block graph - {0}")]
    InconsistentBlockGraph(String),

    /// An instruction tried to pop a value from an empty abstract stack.
    #[error("Stack underflow at IL_{offset:04X}")]
    StackUnderflow {
        /// Byte offset of the offending instruction
        offset: u32,
    },

    /// The number of operands does not match what an instruction or a join point requires.
    ///
    /// Raised for calls whose signature could not be resolved, variable indices outside the
    /// declared ranges, and control flow joins whose incoming stacks have different depths.
    #[error("Operand arity mismatch - {0}")]
    OperandArityMismatch(String),

    /// A metadata token could not be resolved by the member resolver.
    ///
    /// This is the only non-fatal error: the decoder substitutes a placeholder member and
    /// translation continues.
    #[error("Unresolved member - {0}")]
    UnresolvedMember(Token),

    /// Two types meeting at a join point have no common supertype.
    ///
    /// Unrelated value types can not be joined, since there is no implicit conversion
    /// between them.
    #[error("Incompatible merge - {0}")]
    IncompatibleMerge(String),

    /// The abstract stack grew beyond the configured maximum depth.
    ///
    /// The associated value shows the limit that was reached.
    #[error("Reached the maximum abstract stack depth - {0}")]
    StackLimit(usize),

    /// The instruction encoder was given an invalid instruction, operand or label.
    #[error("Invalid encoding - {0}")]
    InvalidEncoding(String),

    /// A method failed to translate.
    ///
    /// Produced at the method-translation boundary so that batch reports carry the identity
    /// of every method that contributed no output.
    #[error("Failed to translate {method}: {source}")]
    MethodFailed {
        /// Name of the method that failed
        method: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if this error aborts the translation of the enclosing method.
    ///
    /// [`Error::UnresolvedMember`] is absorbed by the pipeline and replaced by a placeholder,
    /// every other error discards the method.
    #[must_use]
    pub fn is_fatal_for_method(&self) -> bool {
        match self {
            Error::UnresolvedMember(_) => false,
            Error::MethodFailed { source, .. } => source.is_fatal_for_method(),
            _ => true,
        }
    }
}
