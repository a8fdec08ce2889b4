//! Per-module index width parameters.
//!
//! Every index stored in a table row is either 2 or 4 bytes wide. The width is decided once
//! per module from the row counts of all tables and the sizes of the heaps, before any row is
//! read or written:
//!
//! - a simple index into table `T` is 2 bytes iff `T` has at most `0xFFFF` rows
//! - a coded index is 2 bytes iff every target table has fewer than `1 << (16 - tag_bits)` rows
//! - a `#Strings`/`#Blob` index is 2 bytes iff the heap is at most `0xFFFF` bytes long, a
//!   `#GUID` index iff the heap holds at most `0xFFFF` entries

use std::sync::Arc;

use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{CodedIndexType, HeapKind, TableId};

/// `HeapSizes` flag: `#Strings` indices are 4 bytes
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` flag: `#GUID` indices are 4 bytes
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` flag: `#Blob` indices are 4 bytes
pub const HEAP_LARGE_BLOB: u8 = 0x04;
/// `HeapSizes` flag: an extra 4-byte value follows the row counts
pub const HEAP_EXTRA_DATA: u8 = 0x40;

/// Index width parameters of one module.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    rows: [u32; 64],
    coded_indexes: [u8; CodedIndexType::COUNT],
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
    custom_heaps: Vec<(&'static str, bool)>,
}

/// Shared reference to a [`TableInfo`]
pub type TableInfoRef = Arc<TableInfo>;

impl TableInfo {
    /// Build the width parameters from row counts and the `HeapSizes` flags.
    ///
    /// `custom_heaps` lists additional string heaps by stream name with their large flag.
    #[must_use]
    pub fn new(rows: [u32; 64], heap_sizes: u8, custom_heaps: Vec<(&'static str, bool)>) -> Self {
        let mut info = TableInfo {
            rows,
            coded_indexes: [2; CodedIndexType::COUNT],
            is_large_index_str: heap_sizes & HEAP_LARGE_STRINGS != 0,
            is_large_index_guid: heap_sizes & HEAP_LARGE_GUID != 0,
            is_large_index_blob: heap_sizes & HEAP_LARGE_BLOB != 0,
            custom_heaps,
        };

        info.calculate_coded_index_bytes();
        info
    }

    /// Build width parameters for hand-written test data
    #[cfg(test)]
    pub fn new_test(
        valid_tables: &[(TableId, u32)],
        large_str: bool,
        large_blob: bool,
        large_guid: bool,
    ) -> Self {
        let mut rows = [0_u32; 64];
        for (table, count) in valid_tables {
            rows[table.index()] = *count;
        }

        let mut heap_sizes = 0;
        if large_str {
            heap_sizes |= HEAP_LARGE_STRINGS;
        }
        if large_guid {
            heap_sizes |= HEAP_LARGE_GUID;
        }
        if large_blob {
            heap_sizes |= HEAP_LARGE_BLOB;
        }

        Self::new(rows, heap_sizes, Vec::new())
    }

    /// The `HeapSizes` byte describing the three standard heaps
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        let mut flags = 0;
        if self.is_large_index_str {
            flags |= HEAP_LARGE_STRINGS;
        }
        if self.is_large_index_guid {
            flags |= HEAP_LARGE_GUID;
        }
        if self.is_large_index_blob {
            flags |= HEAP_LARGE_BLOB;
        }
        flags
    }

    /// Row count of a table
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table.index()]
    }

    /// All row counts, indexed by table kind
    #[must_use]
    pub fn row_counts(&self) -> &[u32; 64] {
        &self.rows
    }

    /// Returns true if simple indices into `table` are 4 bytes
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// Width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// Width of a coded index
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        self.coded_indexes[coded_index_type as usize]
    }

    /// Width of an index into a heap
    #[must_use]
    pub fn heap_bytes(&self, heap: HeapKind) -> u8 {
        let is_large = match heap {
            HeapKind::Strings => self.is_large_index_str,
            HeapKind::Guid => self.is_large_index_guid,
            HeapKind::Blob => self.is_large_index_blob,
            HeapKind::Custom(name) => self
                .custom_heaps
                .iter()
                .any(|(heap_name, large)| *heap_name == name && *large),
        };

        if is_large {
            4
        } else {
            2
        }
    }

    fn calculate_coded_index_bytes(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let limit = 1_u32 << (16 - coded_index.tag_bits());
            let fits = coded_index
                .targets()
                .all(|table| self.rows(table) < limit);

            self.coded_indexes[coded_index as usize] = if fits { 2 } else { 4 };
        }
    }
}

/// Returns true if a byte heap of `len` bytes needs 4-byte indices
#[must_use]
pub fn is_large_heap(len: usize) -> bool {
    len > usize::from(u16::MAX)
}

/// Returns true if a heap stream holding `len` bytes needs 4-byte indices. The stream is
/// sized to a multiple of four, and readers only see that size.
#[must_use]
pub fn is_large_stream(len: usize) -> bool {
    is_large_heap((len + 3) & !3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_index_boundary() {
        let info = TableInfo::new_test(&[(TableId::FIELD, 0xFFFF)], false, false, false);
        assert_eq!(info.table_index_bytes(TableId::FIELD), 2);

        let info = TableInfo::new_test(&[(TableId::FIELD, 0x1_0000)], false, false, false);
        assert_eq!(info.table_index_bytes(TableId::FIELD), 4);
    }

    #[test]
    fn coded_index_boundary() {
        // TypeDefOrRef carries 2 tag bits, leaving 14 bits for rows
        let info = TableInfo::new_test(&[(TableId::TYPE_REF, 0x3FFF)], false, false, false);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 2);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasFieldMarshal), 2);

        let info = TableInfo::new_test(&[(TableId::TYPE_REF, 0x4000)], false, false, false);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::ResolutionScope), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasFieldMarshal), 2);
    }

    #[test]
    fn heap_flags() {
        let info = TableInfo::new_test(&[], true, false, true);
        assert_eq!(info.heap_bytes(HeapKind::Strings), 4);
        assert_eq!(info.heap_bytes(HeapKind::Blob), 2);
        assert_eq!(info.heap_bytes(HeapKind::Guid), 4);
        assert_eq!(info.heap_sizes(), HEAP_LARGE_STRINGS | HEAP_LARGE_GUID);

        assert!(!is_large_heap(0xFFFF));
        assert!(is_large_heap(0x1_0000));
        assert!(!is_large_stream(0xFFFC));
        assert!(is_large_stream(0xFFFD));
    }

    #[test]
    fn custom_heaps() {
        let info = TableInfo::new([0; 64], 0, vec![("#Names", true), ("#Other", false)]);
        assert_eq!(info.heap_bytes(HeapKind::Custom("#Names")), 4);
        assert_eq!(info.heap_bytes(HeapKind::Custom("#Other")), 2);
        assert_eq!(info.heap_bytes(HeapKind::Custom("#Missing")), 2);
    }
}
