//! A cursor over a byte slice for reading metadata structures.
//!
//! [`Parser`] is used by the signature grammar, the custom-attribute and marshalling
//! decoders, the method-body reader and the IL decoder. All reads are bounds-checked
//! and advance the cursor.

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::tables::{TableId, TableIndex},
    Result,
};

/// A cursor over a byte slice.
///
/// # Examples
///
/// ```rust
/// use cilmerge::Parser;
///
/// let data = [0x81, 0x02, 0x05];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_compressed_uint()?, 0x102);
/// assert_eq!(parser.read_le::<u8>()?, 0x05);
/// assert!(!parser.has_more_data());
/// # Ok::<(), cilmerge::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if there are bytes left after the cursor
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left after the cursor
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the cursor to an absolute position; `pos` may equal the data length.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The underlying data
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(self.data[self.position])
    }

    /// Skip padding until the cursor is a multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a primitive value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `len` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read an ECMA-335 compressed unsigned integer (1, 2 or 4 bytes).
    ///
    /// # Errors
    /// Returns an error on an invalid lead byte or when the data ends early.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read an ECMA-335 compressed signed integer.
    ///
    /// The sign bit is rotated into the lowest bit and sign extension depends on how
    /// many bytes the value occupies.
    ///
    /// # Errors
    /// Returns an error on an invalid lead byte or when the data ends early.
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;
        let width = self.position - start;

        let magnitude = (unsigned >> 1) as i32;
        if unsigned & 1 == 0 {
            return Ok(magnitude);
        }

        let bias = match width {
            1 => 0x40,
            2 => 0x2000,
            _ => 0x1000_0000,
        };
        Ok(magnitude - bias)
    }

    /// Read a compressed `TypeDefOrRef` token as used inside signatures.
    ///
    /// # Errors
    /// Returns an error for an invalid tag or a null row.
    pub fn read_compressed_token(&mut self) -> Result<TableIndex> {
        let compressed_token = self.read_compressed_uint()?;

        let table = match compressed_token & 0x3 {
            0x0 => TableId::TYPE_DEF,
            0x1 => TableId::TYPE_REF,
            0x2 => TableId::TYPE_SPEC,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        let row = compressed_token >> 2;
        if row == 0 {
            return Err(malformed_error!("Null compressed token in signature"));
        }

        Ok(TableIndex::new(table, row - 1))
    }

    /// Read a `SerString`: compressed length followed by UTF-8, `0xFF` meaning null.
    ///
    /// # Errors
    /// Returns an error for invalid UTF-8 or when the data ends early.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.position += 1;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| {
                malformed_error!(
                    "Invalid UTF-8 string at offset {}-{}: {}",
                    start,
                    start + length,
                    e.utf8_error()
                )
            })
    }

    /// Read a NUL-terminated UTF-8 string; the terminator is consumed.
    ///
    /// # Errors
    /// Returns an error if no terminator is found or the bytes are not UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let Some(length) = self.data[start..].iter().position(|b| *b == 0) else {
            return Err(malformed_error!(
                "Unterminated string starting at offset {}",
                start
            ));
        };

        let bytes = &self.data[start..start + length];
        self.position = start + length + 1;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                e.utf8_error()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_compressed_uint() {
        let test_cases = vec![
            (vec![0x03], 3),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x80], 0x80),
            (vec![0xBF, 0xFF], 0x3FFF),
            (vec![0xC0, 0x00, 0x40, 0x00], 0x4000),
            (vec![0xDF, 0xFF, 0xFF, 0xFF], 0x1FFF_FFFF),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_compressed_uint().unwrap(), expected);
            assert!(!parser.has_more_data());
        }
    }

    #[test]
    fn read_compressed_uint_invalid_lead() {
        let data = [0xE0, 0x00, 0x00, 0x00];
        assert!(Parser::new(&data).read_compressed_uint().is_err());
    }

    #[test]
    fn read_compressed_int_sign_extension() {
        let test_cases: Vec<(Vec<u8>, i32)> = vec![
            (vec![0x06], 3),
            (vec![0x7B], -3),
            (vec![0x80, 0x80], 64),
            (vec![0x01], -64),
            (vec![0xC0, 0x00, 0x40, 0x00], 8192),
            (vec![0x80, 0x01], -8192),
            (vec![0xDF, 0xFF, 0xFF, 0xFE], 268_435_455),
            (vec![0xC0, 0x00, 0x00, 0x01], -268_435_456),
        ];

        for (input, expected) in test_cases {
            assert_eq!(Parser::new(&input).read_compressed_int().unwrap(), expected);
        }
    }

    #[test]
    fn read_compressed_token() {
        // TypeRef row 0x12 -> (0x12 << 2) | 1
        let data = [0x49];
        let index = Parser::new(&data).read_compressed_token().unwrap();
        assert_eq!(index, TableIndex::new(TableId::TYPE_REF, 0x11));

        let invalid = [0x03];
        assert!(Parser::new(&invalid).read_compressed_token().is_err());
    }

    #[test]
    fn ser_string() {
        let data = [0x03, b'a', b'b', b'c', 0xFF];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("abc"));
        assert_eq!(parser.read_ser_string().unwrap(), None);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn seek_and_bounds() {
        let data = [1, 2, 3, 4];
        let mut parser = Parser::new(&data);
        parser.seek(4).unwrap();
        assert!(parser.seek(5).is_err());
        assert!(parser.peek_byte().is_err());
        parser.seek(1).unwrap();
        assert_eq!(parser.read_bytes(2).unwrap(), &[2, 3]);
        assert!(parser.read_bytes(2).is_err());
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
    }

    #[test]
    fn utf8_strings() {
        let data = b"abc\0de\0x";
        let mut parser = Parser::new(data);
        assert_eq!(parser.read_string_utf8().unwrap(), "abc");
        assert_eq!(parser.read_string_utf8().unwrap(), "de");
        assert!(parser.read_string_utf8().is_err());
    }
}
