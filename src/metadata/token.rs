//! Metadata tokens as they appear in CIL instruction operands.
//!
//! A token is a 32-bit value whose high byte names a metadata table (or the user string heap)
//! and whose low 24 bits are a row index. Instructions such as `call`, `ldfld`, `newobj` or
//! `ldstr` carry a token that the [`crate::metadata::resolver::MemberResolver`] turns into a
//! typed member. The table byte is enough to tell which kind of member a token can denote,
//! which the decoder uses for the polymorphic `ldtoken` instruction.
//!
//! # Examples
//!
//! ```rust
//! use ciltac::metadata::token::Token;
//!
//! let token = Token::new(0x0A00_0012);
//! assert_eq!(token.table(), Token::MEMBER_REF);
//! assert_eq!(token.row(), 0x12);
//! assert!(token.may_be_method() && token.may_be_field());
//! ```

use std::fmt;

/// A metadata token referencing a row of a metadata table or a user string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Table byte of `TypeRef` tokens.
    pub const TYPE_REF: u8 = 0x01;
    /// Table byte of `TypeDef` tokens.
    pub const TYPE_DEF: u8 = 0x02;
    /// Table byte of `Field` tokens.
    pub const FIELD: u8 = 0x04;
    /// Table byte of `MethodDef` tokens.
    pub const METHOD_DEF: u8 = 0x06;
    /// Table byte of `MemberRef` tokens, which denote either a method or a field.
    pub const MEMBER_REF: u8 = 0x0A;
    /// Table byte of `StandAloneSig` tokens, used by `calli`.
    pub const STANDALONE_SIG: u8 = 0x11;
    /// Table byte of `TypeSpec` tokens.
    pub const TYPE_SPEC: u8 = 0x1B;
    /// Table byte of `MethodSpec` tokens.
    pub const METHOD_SPEC: u8 = 0x2B;
    /// Heap byte of user string tokens, used by `ldstr`.
    pub const USER_STRING: u8 = 0x70;

    /// Creates a token from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table byte and a row index.
    #[must_use]
    pub const fn from_parts(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw 32-bit value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table byte.
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row index.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the token can denote a type.
    #[must_use]
    pub const fn may_be_type(&self) -> bool {
        matches!(
            self.table(),
            Self::TYPE_REF | Self::TYPE_DEF | Self::TYPE_SPEC
        )
    }

    /// Returns `true` if the token can denote a method.
    #[must_use]
    pub const fn may_be_method(&self) -> bool {
        matches!(
            self.table(),
            Self::METHOD_DEF | Self::MEMBER_REF | Self::METHOD_SPEC
        )
    }

    /// Returns `true` if the token can denote a field.
    #[must_use]
    pub const fn may_be_field(&self) -> bool {
        matches!(self.table(), Self::FIELD | Self::MEMBER_REF)
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::from_parts(Token::METHOD_DEF, 0x2A);
        assert_eq!(token.value(), 0x0600_002A);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 0x2A);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());

        let token = Token::from_parts(Token::FIELD, 0xFFFF_FFFF);
        assert_eq!(token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn member_kinds() {
        let type_def = Token::new(0x0200_0005);
        assert!(type_def.may_be_type());
        assert!(!type_def.may_be_method());
        assert!(!type_def.may_be_field());

        let member_ref = Token::new(0x0A00_0001);
        assert!(!member_ref.may_be_type());
        assert!(member_ref.may_be_method());
        assert!(member_ref.may_be_field());

        assert!(Token::new(0x1B00_0001).may_be_type());
        assert!(Token::new(0x2B00_0001).may_be_method());
        assert!(!Token::new(0x7000_0001).may_be_field());
    }

    #[test]
    fn formatting() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{}", token), "0x06000001");
        let debug_str = format!("{:?}", token);
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));

        let raw: u32 = token.into();
        assert_eq!(Token::from(raw), token);
    }
}
