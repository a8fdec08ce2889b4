//! Metadata tables: schema, typed rows, and the `#~` stream codec.
//!
//! # Key Components
//!
//! - [`SchemaRegistry`] / [`TableDescriptor`] - the columns, ordering and deduplication rule
//!   of every table kind, the 45 fixed ECMA-335 tables plus registered extension tables
//! - [`ColumnCodec`] - how one column is encoded and how wide it is for a given
//!   [`TableInfo`]
//! - [`CodedIndexType`] - the 13 coded index families of ECMA-335 II.24.2.6
//! - [`Tables`] / [`Row`] / [`Cell`] - the typed row store of one module
//! - [`Permutation`] - old to new row positions, produced by sorting and merging
//! - [`RawTables`] / [`write_tables`] - reading and writing the `#~` stream
//!
//! # Example
//!
//! ```rust
//! use cilmerge::metadata::tables::{Cell, TableId, Tables};
//!
//! let mut tables = Tables::default();
//! let module_ref = tables.push(TableId::MODULE_REF, vec![Cell::str("kernel32.dll")])?;
//! assert_eq!(tables.row(module_ref)?.string(0)?, "kernel32.dll");
//! # Ok::<(), cilmerge::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Sections 22 and 24.2.6

mod cell;
mod codedindex;
mod column;
pub mod columns;
mod engine;
mod index;
mod permutation;
mod schema;
mod table;
mod tableid;
mod tableinfo;

pub use cell::{Blob, Cell, RawData, RemapIndices, Row};
pub use codedindex::CodedIndexType;
pub use column::{BlobKind, ColumnCodec, ColumnDescriptor, DataKind, HeapKind, RawDataKind};
pub use engine::{
    encode_blob, parse_blob, row_size, write_tables, RawTables, TablesHeader,
    TABLES_MAJOR_VERSION, TABLES_MINOR_VERSION,
};
pub use index::TableIndex;
pub use permutation::Permutation;
pub use schema::{RowOrdering, SchemaRegistry, TableDescriptor};
pub use table::{Table, Tables};
pub use tableid::TableId;
pub use tableinfo::{
    is_large_heap, is_large_stream, TableInfo, TableInfoRef, HEAP_EXTRA_DATA, HEAP_LARGE_BLOB, HEAP_LARGE_GUID,
    HEAP_LARGE_STRINGS,
};
