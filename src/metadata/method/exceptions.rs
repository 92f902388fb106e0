//! Raw exception handling clauses of CIL method bodies.
//!
//! A clause describes a protected byte range and the handler guarding it, exactly as stored
//! in the extra data sections of a method body (ECMA-335 Partition II, 25.4.6). Offsets are
//! relative to the start of the code. The
//! [`crate::assembly::exceptions::import_clauses`] stage maps these onto decoded instructions.

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause. The class token names the caught type.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One exception handling clause, in byte offsets.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// # Examples
///
/// ```rust
/// use ciltac::metadata::{method::ExceptionHandler, token::Token};
///
/// let clause = ExceptionHandler::catch(0, 10, 10, 6, Token::new(0x0100_0003));
/// assert!(clause.is_catch());
/// assert_eq!(clause.class_token(), Token::new(0x0100_0003));
/// assert_eq!(clause.handler_end(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Offset of the filter code for filter clauses, the class token for typed clauses.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// A typed `catch` clause.
    #[must_use]
    pub fn catch(
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        class: Token,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: class.value(),
        }
    }

    /// A filter clause whose predicate starts at `filter_offset`.
    #[must_use]
    pub fn filter(
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        filter_offset: u32,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset,
        }
    }

    /// A `finally` clause.
    #[must_use]
    pub fn finally(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: 0,
        }
    }

    /// A `fault` clause.
    #[must_use]
    pub fn fault(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FAULT,
            ..Self::finally(try_offset, try_length, handler_offset, handler_length)
        }
    }

    /// Returns `true` for typed `catch` clauses.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        !self.is_filter() && !self.is_finally() && !self.is_fault()
    }

    /// Returns `true` for filter clauses.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Returns `true` for `finally` clauses.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FINALLY)
    }

    /// Returns `true` for `fault` clauses.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FAULT)
    }

    /// The caught type token of a typed clause.
    #[must_use]
    pub fn class_token(&self) -> Token {
        Token::new(self.filter_offset)
    }

    /// First byte after the protected range.
    #[must_use]
    pub fn try_end(&self) -> u64 {
        u64::from(self.try_offset) + u64::from(self.try_length)
    }

    /// First byte after the handler.
    #[must_use]
    pub fn handler_end(&self) -> u64 {
        u64::from(self.handler_offset) + u64::from(self.handler_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let filter = ExceptionHandler::filter(0, 4, 12, 3, 4);
        assert!(filter.is_filter());
        assert!(!filter.is_catch());

        let finally = ExceptionHandler::finally(0, 4, 4, 2);
        assert!(finally.is_finally());
        assert!(!finally.is_fault());
        assert_eq!(finally.try_end(), 4);

        let fault = ExceptionHandler::fault(0, 4, 4, 2);
        assert!(fault.is_fault());
        assert!(!fault.is_catch());
        assert_eq!(fault.handler_end(), 6);
    }

    #[test]
    fn ends_do_not_overflow() {
        let clause = ExceptionHandler::finally(u32::MAX, u32::MAX, 0, 0);
        assert_eq!(clause.try_end(), 2 * u64::from(u32::MAX));
    }
}
