//! String heap (`#Strings`) reader and builder.
//!
//! The `#Strings` heap stores identifiers as NUL-terminated UTF-8. Offset 0 always holds the
//! empty string. Custom string heaps declared by extension tables use the same layout.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{collections::HashMap, ffi::CStr};

use crate::{Error::OutOfBounds, Result};

/// A view of a `#Strings`-formatted heap.
///
/// # Examples
///
/// ```rust
/// use cilmerge::metadata::streams::Strings;
/// let data = &[0u8, b'H', b'e', b'l', b'l', b'o', 0u8];
/// let strings = Strings::from(data)?;
/// assert_eq!(strings.get(1)?, "Hello");
/// assert_eq!(strings.get(0)?, "");
/// # Ok::<(), cilmerge::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct Strings<'a> {
    pub(super) data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view from the stream bytes
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty string
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// The heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the heap has no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The string starting at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, the string is unterminated or is not
    /// valid UTF-8
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => match result.to_str() {
                Ok(result) => Ok(result),
                Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
            },
            Err(_) => Err(malformed_error!("Unterminated string at index - {}", index)),
        }
    }
}

/// Builds a `#Strings`-formatted heap, storing each distinct string once.
#[derive(Debug, Clone)]
pub struct StringsBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        StringsBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringsBuilder {
    /// An empty heap holding only the empty string
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset of `value`, appending it if it was not interned yet.
    ///
    /// # Errors
    /// Returns an error if the string contains a NUL character
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }

        if value.as_bytes().contains(&0) {
            return Err(malformed_error!(
                "String '{}' contains an embedded NUL",
                value.escape_debug()
            ));
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Current heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if only the empty string is present
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
