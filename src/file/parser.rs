//! Low-level byte stream cursor for CIL decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used by the instruction decoder and the method header parser. It offers bounds-checked
//! access to a byte slice; every read either succeeds completely or fails with
//! [`crate::Error::OutOfBounds`] without moving the cursor.
//!
//! # Usage Examples
//!
//! ```rust
//! use ciltac::Parser;
//!
//! // ldc.i4.s 10; ret
//! let data = [0x1F, 0x0A, 0x2A];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0x1F);
//! assert_eq!(parser.read_le::<i8>()?, 10);
//! assert_eq!(parser.remaining(), 1);
//! # Ok::<(), ciltac::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A cursor over a byte slice with bounds-checked little-endian reads.
///
/// The parser maintains an internal position cursor and provides bounds checking
/// to prevent buffer overruns when reading malformed or truncated data.
///
/// # Examples
///
/// ```rust
/// use ciltac::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut parser = Parser::new(&data);
///
/// let first = parser.read_le::<u32>()?;
/// assert_eq!(first, 0x04030201);
///
/// parser.seek(6)?;
/// let last_bytes = parser.read_le::<u16>()?;
/// assert_eq!(last_bytes, 0x0807);
/// # Ok::<(), ciltac::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is at least one more byte to read.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to exactly the end of the buffer is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position lies beyond the buffer.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let target = self.position.checked_add(step).ok_or(OutOfBounds)?;
        self.seek(target)
    }

    /// Returns the current position of the cursor.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns the whole underlying buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Read the byte at the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the buffer.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a value of type `T` in little-endian byte order and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Read `length` raw bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_reads() {
        let data = [0x20, 0x78, 0x56, 0x34, 0x12, 0x2A];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.len(), 6);
        assert!(!parser.is_empty());
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x20);
        assert_eq!(parser.read_le::<i32>().unwrap(), 0x1234_5678);
        assert_eq!(parser.pos(), 5);
        assert_eq!(parser.peek_byte().unwrap(), 0x2A);
        assert_eq!(parser.pos(), 5);
        assert!(parser.has_more_data());
        parser.advance_by(1).unwrap();
        assert!(!parser.has_more_data());
        assert_eq!(parser.remaining(), 0);
    }

    #[test]
    fn bounds_are_checked() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        assert!(matches!(parser.read_le::<u32>(), Err(Error::OutOfBounds)));
        assert_eq!(parser.pos(), 0);
        assert!(matches!(parser.seek(4), Err(Error::OutOfBounds)));
        assert!(parser.seek(3).is_ok());
        assert!(matches!(parser.peek_byte(), Err(Error::OutOfBounds)));
        assert!(matches!(parser.advance_by(1), Err(Error::OutOfBounds)));
    }

    #[test]
    fn read_bytes_slices() {
        let data = [0x0A, 0x0B, 0x0C, 0x0D];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_bytes(3).unwrap(), &[0x0A, 0x0B, 0x0C]);
        assert!(matches!(parser.read_bytes(2), Err(Error::OutOfBounds)));
        assert_eq!(parser.read_bytes(1).unwrap(), &[0x0D]);
        assert!(parser.read_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn empty_parser() {
        let parser = Parser::new(&[]);
        assert!(parser.is_empty());
        assert!(!parser.has_more_data());
        assert_eq!(parser.data().len(), 0);
    }
}
