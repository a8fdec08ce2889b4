//! Blob heap (`#Blob`) reader and builder.
//!
//! Every entry is prefixed with its length as a compressed unsigned integer:
//!
//! * `0bbbbbbb` - `bbbbbbb` bytes of data follow
//! * `10bbbbbb x` - `(bbbbbb << 8) + x` bytes of data follow
//! * `110bbbbb x y z` - `(bbbbb << 24) + (x << 16) + (y << 8) + z` bytes of data follow
//!
//! Offset 0 always holds the empty blob.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use crate::{
    file::{io::write_compressed_uint, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// A view of the `#Blob` heap.
///
/// # Examples
///
/// ```rust
/// use cilmerge::metadata::streams::BlobHeap;
/// let data = &[0u8, 0x03, 0x41, 0x42, 0x43];
/// let blob = BlobHeap::from(data)?;
/// assert_eq!(blob.get(1)?, &[0x41, 0x42, 0x43]);
/// # Ok::<(), cilmerge::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct BlobHeap<'a> {
    pub(super) data: &'a [u8],
}

impl<'a> BlobHeap<'a> {
    /// Create a `BlobHeap` view from the stream bytes
    ///
    /// # Errors
    /// Returns an error if the data is empty or does not start with the empty blob
    pub fn from(data: &'a [u8]) -> Result<BlobHeap<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(BlobHeap { data })
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

    /// The blob starting at `index`.
    ///
    /// # Errors
    /// Returns an error if the index or the encoded length points outside of the heap
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let skip = parser.pos();

        let Some(data_start) = index.checked_add(skip) else {
            return Err(OutOfBounds);
        };

        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }

    /// Iterate over all `(offset, blob)` entries of the heap
    #[must_use]
    pub fn iter(&self) -> BlobIterator<'_> {
        BlobIterator {
            blob: self,
            position: 1,
        }
    }
}

/// Iterator over entries in the `#Blob` heap
pub struct BlobIterator<'a> {
    blob: &'a BlobHeap<'a>,
    position: usize,
}

impl<'a> Iterator for BlobIterator<'a> {
    type Item = Result<(usize, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.blob.data.len() {
            return None;
        }

        let start_position = self.position;
        match self.blob.get(self.position) {
            Ok(blob_data) => {
                let mut parser = Parser::new(&self.blob.data[self.position..]);
                match parser.read_compressed_uint() {
                    Ok(_) => {
                        self.position += parser.pos() + blob_data.len();
                        Some(Ok((start_position, blob_data)))
                    }
                    Err(error) => {
                        self.position = self.blob.data.len();
                        Some(Err(error))
                    }
                }
            }
            Err(error) => {
                self.position = self.blob.data.len();
                Some(Err(error))
            }
        }
    }
}

/// Builds a `#Blob` heap, storing each distinct byte sequence once.
#[derive(Debug, Clone)]
pub struct BlobBuilder {
    data: Vec<u8>,
    offsets: HashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        BlobBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl BlobBuilder {
    /// An empty heap holding only the empty blob
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset of `value`, appending it if it was not interned yet.
    ///
    /// # Errors
    /// Returns an error if the blob is too large for a compressed length
    pub fn intern(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }

        let offset = self.data.len() as u32;
        write_compressed_uint(&mut self.data, value.len() as u32)?;
        self.data.extend_from_slice(value);
        self.offsets.insert(value.to_vec(), offset);
        Ok(offset)
    }

    /// Current heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if only the empty blob is present
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
