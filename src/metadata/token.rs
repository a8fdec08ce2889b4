//! Metadata tokens.
//!
//! A token is the 32-bit reference form used by IL operands and by signatures stored outside
//! of the tables: the high byte names the table, the low 24 bits hold the one-based row.
//! User-string references use the pseudo table `0x70` and carry a `#US` heap offset instead.

use std::fmt;

/// Table byte of `ldstr` operands, which reference the `#US` heap rather than a table
pub const USER_STRING_TABLE: u8 = 0x70;

/// A metadata token
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// The raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The one-based row (or heap offset for user strings)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true for the value 0
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if this token references the `#US` heap
    #[must_use]
    pub fn is_user_string(&self) -> bool {
        self.table() == USER_STRING_TABLE
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
        let token = Token(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(!token.is_null());
        assert!(Token(0).is_null());
        assert!(Token(0x7000_0010).is_user_string());
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{}", Token(0x0200_0005)), "0x02000005");
        assert_eq!(
            format!("{:?}", Token(0x0200_0005)),
            "Token(0x02000005, table: 0x02, row: 5)"
        );
    }
}
