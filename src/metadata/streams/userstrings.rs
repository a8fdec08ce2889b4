//! User string heap (`#US`) reader and builder.
//!
//! Entries hold string literals referenced by `ldstr`. Each entry is a compressed byte
//! length, the UTF-16LE code units and one terminal byte that flags strings needing more
//! than 8-bit handling.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use widestring::U16String;

use crate::{
    file::{io::write_compressed_uint, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// A view of the `#US` heap.
///
/// # Examples
///
/// ```rust
/// use cilmerge::metadata::streams::UserStrings;
/// let data = &[0u8, 0x03, 0x41, 0x00, 0x00];
/// let us = UserStrings::from(data)?;
/// assert_eq!(us.get(1)?.to_string_lossy(), "A");
/// # Ok::<(), cilmerge::Error>(())
/// ```
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` view from the stream bytes
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(OutOfBounds);
        }

        Ok(UserStrings { data })
    }

    /// The string at offset `index`.
    ///
    /// # Errors
    /// Returns an error if the entry does not fit the heap or has an even byte length
    /// (the terminal byte is missing)
    pub fn get(&self, index: usize) -> Result<U16String> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        if length == 0 {
            return Ok(U16String::new());
        }

        if length % 2 == 0 {
            return Err(malformed_error!(
                "Invalid user string length {} at index - {}",
                length,
                index
            ));
        }

        let bytes = parser.read_bytes(length)?;
        let units: Vec<u16> = bytes[..length - 1]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(U16String::from_vec(units))
    }
}

/// Returns the terminal byte of a `#US` entry: 1 if any code unit has a non-zero high byte
/// or a low byte ECMA-335 marks as special, otherwise 0
fn terminal_byte(units: &[u16]) -> u8 {
    let special = units.iter().any(|unit| {
        let low = (unit & 0xFF) as u8;
        unit >> 8 != 0 || matches!(low, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
    });
    u8::from(special)
}

/// Builds a `#US` heap, storing each distinct string once.
#[derive(Debug, Clone)]
pub struct UserStringsBuilder {
    data: Vec<u8>,
    offsets: HashMap<Vec<u16>, u32>,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        UserStringsBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl UserStringsBuilder {
    /// An empty heap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset of `value`, appending it if it was not interned yet.
    ///
    /// # Errors
    /// Returns an error if the entry would no longer be addressable by an `ldstr` token
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.intern_units(units)
    }

    /// Like [`UserStringsBuilder::intern`] for raw UTF-16 code units.
    ///
    /// # Errors
    /// Returns an error if the entry would no longer be addressable by an `ldstr` token
    pub fn intern_units(&mut self, units: Vec<u16>) -> Result<u32> {
        if let Some(offset) = self.offsets.get(&units) {
            return Ok(*offset);
        }

        let offset = self.data.len() as u32;
        if offset > 0x00FF_FFFF {
            return Err(malformed_error!("#US heap exceeds the 24-bit token range"));
        }

        write_compressed_uint(&mut self.data, units.len() as u32 * 2 + 1)?;
        for unit in &units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.push(terminal_byte(&units));
        self.offsets.insert(units, offset);
        Ok(offset)
    }

    /// Current heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no string was interned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// The heap bytes, padded to a multiple of four
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let mut data = self.data;
        crate::file::io::align_to(&mut data, 4);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data: [u8; 32] = [
            0x00, 0x1b, 0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00, 0x20, 0x00, 0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00
        ];

        let us_str = UserStrings::from(&data).unwrap();
        assert_eq!(us_str.get(1).unwrap().to_string_lossy(), "Hello, World!");
    }

    #[test]
    fn invalid() {
        assert!(UserStrings::from(&[]).is_err());
        assert!(UserStrings::from(&[0x22, 0x01, 0x00]).is_err());

        let truncated = [0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC];
        let us_str = UserStrings::from(&truncated).unwrap();
        assert!(us_str.get(1).is_err());
    }

    #[test]
    fn builder_sets_terminal_byte() {
        let mut builder = UserStringsBuilder::new();
        let plain = builder.intern("ab").unwrap();
        let wide = builder.intern("\u{20AC}").unwrap();
        assert_eq!(builder.intern("ab").unwrap(), plain);

        let data = builder.finish();
        assert_eq!(&data[1..7], &[0x05, b'a', 0, b'b', 0, 0]);
        assert_eq!(data[wide as usize + 3], 1);

        let heap = UserStrings::from(&data).unwrap();
        assert_eq!(heap.get(wide as usize).unwrap().to_string_lossy(), "\u{20AC}");
    }
}
