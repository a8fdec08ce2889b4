use std::fmt;

use crate::metadata::{tables::TableId, token::Token};

/// A reference to one row of one table.
///
/// `row` is zero-based; the on-disk form is one-based, with `0` meaning null. Nullable
/// references are modelled as `Option<TableIndex>`, so a `TableIndex` always names a row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIndex {
    /// The table the row lives in
    pub table: TableId,
    /// Zero-based row position
    pub row: u32,
}

impl TableIndex {
    /// Create a new index
    #[must_use]
    pub const fn new(table: TableId, row: u32) -> Self {
        TableIndex { table, row }
    }

    /// The 4-byte metadata token (`table << 24 | row + 1`)
    #[must_use]
    pub fn token(self) -> Token {
        Token::new((u32::from(self.table.value()) << 24) | (self.row + 1))
    }

    /// Decode a token; a null row yields `None`.
    ///
    /// # Errors
    /// Returns an error if the token names a table kind outside of the table mask.
    pub fn from_token(token: Token) -> crate::Result<Option<TableIndex>> {
        if token.row() == 0 {
            return Ok(None);
        }

        Ok(Some(TableIndex::new(
            TableId::new(token.table())?,
            token.row() - 1,
        )))
    }

    /// The one-based row number as written into simple index columns
    #[must_use]
    pub fn one_based(self) -> u32 {
        self.row + 1
    }
}

impl fmt::Debug for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.table, self.row)
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.table, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let index = TableIndex::new(TableId::METHOD_DEF, 4);
        assert_eq!(index.token().value(), 0x0600_0005);
        assert_eq!(TableIndex::from_token(index.token()).unwrap(), Some(index));
        assert_eq!(TableIndex::from_token(Token::new(0x0600_0000)).unwrap(), None);
    }
}
