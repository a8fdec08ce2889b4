//! GUID heap (`#GUID`) reader and builder.
//!
//! The heap is a plain sequence of 16-byte GUIDs. Indices into it are 1-based; index 0
//! means "no GUID".
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{Error::OutOfBounds, Result};

/// A view of the `#GUID` heap.
///
/// # Examples
///
/// ```rust
/// use cilmerge::metadata::streams::GuidHeap;
/// let data = [0xAA_u8; 32];
/// let heap = GuidHeap::from(&data)?;
/// assert_eq!(heap.count(), 2);
/// assert!(heap.get(3).is_err());
/// # Ok::<(), cilmerge::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct GuidHeap<'a> {
    pub(super) data: &'a [u8],
}

impl<'a> GuidHeap<'a> {
    /// Create a `GuidHeap` view from the stream bytes
    ///
    /// # Errors
    /// Returns an error if the heap size is not a multiple of 16
    pub fn from(data: &'a [u8]) -> Result<GuidHeap<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap size {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(GuidHeap { data })
    }

    /// Number of GUIDs in the heap
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// The GUID at the 1-based `index`.
    ///
    /// # Errors
    /// Returns an error if the index is 0 or past the last GUID
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index < 1 || index > self.count() {
            return Err(OutOfBounds);
        }

        let start = (index - 1) * 16;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.data[start..start + 16]);

        Ok(uguid::Guid::from_bytes(buffer))
    }
}

/// Builds a `#GUID` heap, storing each distinct GUID once.
#[derive(Debug, Clone, Default)]
pub struct GuidBuilder {
    guids: Vec<uguid::Guid>,
}

impl GuidBuilder {
    /// An empty heap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The 1-based index of `guid`, appending it if it was not interned yet
    pub fn intern(&mut self, guid: uguid::Guid) -> u32 {
        match self.guids.iter().position(|existing| *existing == guid) {
            Some(position) => position as u32 + 1,
            None => {
                self.guids.push(guid);
                self.guids.len() as u32
            }
        }
    }

    /// Current heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.guids.len() * 16
    }

    /// Returns true if no GUID was interned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// The heap bytes
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.guids.iter().flat_map(|guid| guid.to_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 48] = [
            0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let guids = GuidHeap::from(&data).unwrap();

        assert_eq!(
            guids.get(1).unwrap(),
            uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
        assert_eq!(
            guids.get(2).unwrap(),
            uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA")
        );
        assert_eq!(
            guids.get(3).unwrap(),
            uguid::guid!("00000000-0000-0000-0000-000000000000")
        );
        assert!(guids.get(0).is_err());
        assert!(guids.get(4).is_err());
    }

    #[test]
    fn builder_interns() {
        let first = uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let second = uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA");

        let mut builder = GuidBuilder::new();
        assert_eq!(builder.intern(first), 1);
        assert_eq!(builder.intern(second), 2);
        assert_eq!(builder.intern(first), 1);

        let data = builder.finish();
        let heap = GuidHeap::from(&data).unwrap();
        assert_eq!(heap.get(2).unwrap(), second);
    }
}
