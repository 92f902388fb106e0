//! Bounds-checked access to raw method body bytes.
//!
//! Method bodies reach this crate as plain byte slices, either the code buffer of a method or a
//! complete method blob including its header and extra data sections. This module provides the
//! primitive reading layer used by the instruction decoder and the method header parser:
//!
//! - [`crate::file::io`] - Little-endian primitive reads through the [`crate::file::io::CilIO`] trait
//! - [`crate::file::parser`] - The cursor-based [`crate::Parser`]

pub mod io;
pub mod parser;
