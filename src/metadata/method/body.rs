//! Method header and extra data section parsing.
//!
//! A serialized method body starts with either a one-byte tiny header or a twelve-byte fat
//! header, followed by the code and, for fat headers, optional extra data sections holding the
//! exception handling clauses (ECMA-335 Partition II, 25.4). [`MethodBody::parse`] splits a
//! method blob into these parts so that it can be fed to the translation pipeline directly.

use crate::{
    file::io::{read_le, read_le_at},
    metadata::{
        method::{
            ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags,
            METHOD_HEADER_FORMAT_MASK,
        },
        token::Token,
    },
    Error::OutOfBounds,
    Result,
};

/// Size of a fat exception handling clause.
const FAT_CLAUSE_SIZE: u32 = 24;
/// Size of a small exception handling clause.
const SMALL_CLAUSE_SIZE: u32 = 12;

/// A parsed method body.
///
/// # Examples
///
/// ```rust
/// use ciltac::metadata::method::MethodBody;
///
/// // Tiny header announcing two bytes of code: ldc.i4.1; ret
/// let body = MethodBody::parse(&[0x0A, 0x17, 0x2A])?;
/// assert!(!body.is_fat);
/// assert_eq!(body.code, vec![0x17, 0x2A]);
/// assert_eq!(body.size(), 3);
/// # Ok::<(), ciltac::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// The instruction stream
    pub code: Vec<u8>,
    /// Size of the header in bytes
    pub size_header: usize,
    /// Token of the local variable signature, null if the method has no locals
    pub local_var_sig_token: Token,
    /// Maximum evaluation stack depth declared by the compiler
    pub max_stack: usize,
    /// `true` if the body uses the fat header format
    pub is_fat: bool,
    /// `true` if locals are zero-initialized
    pub is_init_local: bool,
    /// Exception handling clauses, in declaration order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Parses a method blob starting at its header.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedStream`] for an unknown header format and
    /// [`crate::Error::OutOfBounds`] if the blob is shorter than its header claims.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & METHOD_HEADER_FORMAT_MASK))
        {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    code: data[1..=size_code].to_vec(),
                    size_header: 1,
                    local_var_sig_token: Token::new(0),
                    max_stack: 8,
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < 12 {
                    return Err(malformed_error!(
                        "Fat method header declares {} bytes",
                        size_header
                    ));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                let code_end = size_header.checked_add(size_code).ok_or(OutOfBounds)?;
                if data.len() < code_end {
                    return Err(OutOfBounds);
                }

                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000_1111_1111_1111_u16);
                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::parse_sections(data, code_end)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    code: data[size_header..code_end].to_vec(),
                    size_header,
                    local_var_sig_token: Token::new(read_le::<u32>(&data[8..])?),
                    max_stack: usize::from(read_le::<u16>(&data[2..])?),
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// Exception Handling -> II.25.4.6. The extra sections currently can only contain
    /// exception handling data.
    fn parse_sections(data: &[u8], code_end: usize) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();
        let mut cursor = (code_end + 3) & !3;

        while data.len() >= cursor + 4 {
            let section_flags = SectionFlags::from_bits_truncate(data[cursor]);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                log::debug!("skipping non-EH method data section {:#04x}", data[cursor]);
                break;
            }

            let is_fat = section_flags.contains(SectionFlags::FAT_FORMAT);
            let section_size = if is_fat {
                read_le::<u32>(&data[cursor..])? >> 8
            } else {
                u32::from(data[cursor + 1])
            };
            if section_size < 4 || data.len() < cursor + section_size as usize {
                return Err(malformed_error!(
                    "Exception section at {} declares {} bytes",
                    cursor,
                    section_size
                ));
            }

            let section_end = cursor + section_size as usize;
            cursor += 4;

            if is_fat {
                for _ in 0..(section_size - 4) / FAT_CLAUSE_SIZE {
                    // Fat clause flags are stored as u32, only the low bits are defined
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = read_le_at::<u32>(data, &mut cursor)? as u16;
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                        try_offset: read_le_at::<u32>(data, &mut cursor)?,
                        try_length: read_le_at::<u32>(data, &mut cursor)?,
                        handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                        handler_length: read_le_at::<u32>(data, &mut cursor)?,
                        filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
            } else {
                for _ in 0..(section_size - 4) / SMALL_CLAUSE_SIZE {
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut cursor,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
            cursor = (section_end + 3) & !3;
        }

        Ok(exception_handlers)
    }

    /// Total size of header and code in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_header + self.code.len()
    }
}
