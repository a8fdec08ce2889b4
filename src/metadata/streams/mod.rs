//! Metadata heaps.
//!
//! Readers are zero-copy views over the stream bytes of a module; builders intern values
//! while a table set is serialized and produce the heap bytes afterwards.
//!
//! - **`#Strings`** - NUL-terminated UTF-8 identifiers ([`Strings`], [`StringsBuilder`]).
//!   Custom string heaps declared by extension tables share this format.
//! - **`#US`** - length-prefixed UTF-16 literals used by `ldstr` ([`UserStrings`],
//!   [`UserStringsBuilder`])
//! - **`#Blob`** - length-prefixed binary data: signatures, custom attribute values,
//!   marshalling descriptors ([`BlobHeap`], [`BlobBuilder`])
//! - **`#GUID`** - 16-byte GUIDs addressed by 1-based index ([`GuidHeap`], [`GuidBuilder`])
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24.2

mod blob;
mod guid;
mod strings;
mod userstrings;

pub use blob::{BlobBuilder, BlobHeap, BlobIterator};
pub use guid::{GuidBuilder, GuidHeap};
pub use strings::{Strings, StringsBuilder};
pub use userstrings::{UserStrings, UserStringsBuilder};

use std::collections::BTreeMap;

use crate::{metadata::tables::HeapKind, Result};

const EMPTY_HEAP: &[u8] = &[0];

/// The heap readers of one module, used while its table rows are decoded.
///
/// Missing streams read as empty heaps.
#[derive(Clone)]
pub struct HeapReaders<'a> {
    /// `#Strings`
    pub strings: Strings<'a>,
    /// `#Blob`
    pub blob: BlobHeap<'a>,
    /// `#GUID`
    pub guid: GuidHeap<'a>,
    /// Custom string heaps by stream name
    pub custom: BTreeMap<String, Strings<'a>>,
}

impl<'a> HeapReaders<'a> {
    /// Views over the given stream bytes; `None` stands for a missing stream.
    ///
    /// # Errors
    /// Returns an error if a present heap is malformed
    pub fn new(
        strings: Option<&'a [u8]>,
        blob: Option<&'a [u8]>,
        guid: Option<&'a [u8]>,
    ) -> Result<HeapReaders<'a>> {
        Ok(HeapReaders {
            strings: Strings::from(strings.unwrap_or(EMPTY_HEAP))?,
            blob: BlobHeap::from(blob.unwrap_or(EMPTY_HEAP))?,
            guid: GuidHeap::from(guid.unwrap_or(&[]))?,
            custom: BTreeMap::new(),
        })
    }

    /// Empty heaps
    #[must_use]
    pub fn empty() -> HeapReaders<'static> {
        HeapReaders {
            strings: Strings { data: EMPTY_HEAP },
            blob: BlobHeap { data: EMPTY_HEAP },
            guid: GuidHeap { data: &[] },
            custom: BTreeMap::new(),
        }
    }

    /// Register a custom string heap.
    ///
    /// # Errors
    /// Returns an error if the heap is malformed
    pub fn add_custom(&mut self, name: &str, data: &'a [u8]) -> Result<()> {
        self.custom.insert(name.to_string(), Strings::from(data)?);
        Ok(())
    }

    /// The string at `offset` of a string-formatted heap. A custom heap that is not present
    /// only holds the empty string.
    ///
    /// # Errors
    /// Returns an error if the offset lies outside of the heap or the string is malformed
    pub fn string(&self, heap: HeapKind, offset: u32) -> Result<&'a str> {
        match heap {
            HeapKind::Strings => self.strings.get(offset as usize),
            HeapKind::Custom(name) => match self.custom.get(name) {
                Some(strings) => strings.get(offset as usize),
                None if offset == 0 => Ok(""),
                None => Err(malformed_error!("Heap {} is not present", name)),
            },
            HeapKind::Guid | HeapKind::Blob => {
                Err(malformed_error!("{} is not a string heap", heap.stream_name()))
            }
        }
    }
}

/// The heap builders used while one table set is serialized.
#[derive(Debug, Clone, Default)]
pub struct HeapBuilders {
    /// `#Strings`
    pub strings: StringsBuilder,
    /// `#Blob`
    pub blob: BlobBuilder,
    /// `#GUID`
    pub guid: GuidBuilder,
    /// `#US`
    pub user_strings: UserStringsBuilder,
    /// Custom string heaps by stream name
    pub custom: BTreeMap<&'static str, StringsBuilder>,
}

impl HeapBuilders {
    /// Fresh builders
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The builder of a custom string heap, created on first use
    pub fn custom(&mut self, name: &'static str) -> &mut StringsBuilder {
        self.custom.entry(name).or_default()
    }
}
