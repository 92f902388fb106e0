//! Primitive little-endian reads for method body decoding.
//!
//! Every multi-byte value in a CIL instruction stream and in a method header is stored in
//! little-endian byte order (ECMA-335 Partition II, 25.4). The [`CilIO`] trait abstracts over
//! the numeric types the decoder needs, so that a single generic function can read any of them
//! with bounds checking.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::file::io::{read_le, read_le_at};
//!
//! let data = [0x2A, 0x00, 0x01, 0x00, 0x00, 0x00];
//! let first: u16 = read_le(&data)?;
//! assert_eq!(first, 0x002A);
//!
//! let mut offset = 2;
//! let second: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!(second, 1);
//! assert_eq!(offset, 6);
//! # Ok::<(), ciltac::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for types that can be decoded from little-endian bytes.
///
/// Implemented for all primitive integer and floating point types which appear as CIL
/// instruction operands or method header fields.
pub trait CilIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    ///
    /// This type must be convertible from a byte slice and is used for reading
    /// binary data in little-endian format.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read on success and left untouched on failure.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}
