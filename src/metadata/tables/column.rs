//! Column codecs.
//!
//! Every column of a table schema is described by a [`ColumnDescriptor`]: a name and a
//! [`ColumnCodec`]. The codec decides two things:
//!
//! - the [`DataKind`], which fixes the serialized width of the column once the module's
//!   [`TableInfo`] is known, before any byte is read or written
//! - the conversion between the positional raw value (`u32`) and the typed [`Cell`],
//!   including heap lookups and signature parsing, performed by the table engine
//!
//! Raw-data-reference columns hold an RVA or an offset into a PE section. Their content is
//! not part of the row; the engine resolves it against the image sections in a second pass
//! and materializes it through the section part builder on write.

use crate::metadata::tables::{Cell, CodedIndexType, RawData, TableId, TableIndex, TableInfo};

/// A metadata heap that columns can index.
///
/// `Custom` names an additional string-formatted heap by its stream name, which extension
/// tables may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// The `#Strings` heap
    Strings,
    /// The `#GUID` heap
    Guid,
    /// The `#Blob` heap
    Blob,
    /// An additional string heap, identified by stream name (e.g. `"#Names"`)
    Custom(&'static str),
}

impl HeapKind {
    /// The stream name of this heap
    #[must_use]
    pub fn stream_name(&self) -> &'static str {
        match self {
            HeapKind::Strings => "#Strings",
            HeapKind::Guid => "#GUID",
            HeapKind::Blob => "#Blob",
            HeapKind::Custom(name) => name,
        }
    }
}

/// How the content of a blob column is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    /// Opaque bytes (public keys, hash values)
    Bytes,
    /// A method signature (`MethodDef.Signature`)
    MethodSig,
    /// A field signature (`Field.Signature`)
    FieldSig,
    /// A method or field signature, told apart by the leading byte (`MemberRef.Signature`)
    MemberRefSig,
    /// A local variable, method or field signature (`StandAloneSig.Signature`)
    StandAloneSig,
    /// A property signature
    PropertySig,
    /// A type specification
    TypeSpec,
    /// A generic method instantiation
    MethodSpec,
    /// A custom attribute value; decoded once the constructor signatures are resolved
    CustomAttribute,
    /// A marshalling descriptor
    Marshal,
    /// A permission set
    Security,
    /// A constant value, interpreted by the element type held in a sibling column
    Constant {
        /// Position of the element type column in the same row
        element_type_column: usize,
    },
}

impl BlobKind {
    /// Whether values of this kind are signatures that embed table indices
    #[must_use]
    pub fn is_signature(self) -> bool {
        matches!(
            self,
            BlobKind::MethodSig
                | BlobKind::FieldSig
                | BlobKind::MemberRefSig
                | BlobKind::StandAloneSig
                | BlobKind::PropertySig
                | BlobKind::TypeSpec
                | BlobKind::MethodSpec
        )
    }
}

/// How the content of a raw-data-reference column is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawDataKind {
    /// A method body at an RVA
    MethodBody,
    /// Initial field data at an RVA
    FieldData,
    /// An embedded resource at an offset into the CLI resources directory
    ManifestResource,
}

/// The kind of a column as far as its serialized width is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// A constant of the given number of bytes
    Fixed(u8),
    /// An index into one table
    TableIndex(TableId),
    /// A coded index into a set of tables
    CodedIndex(CodedIndexType),
    /// An index into a heap
    HeapIndex(HeapKind),
    /// A 4-byte RVA or offset referencing section content
    RawDataReference,
}

impl DataKind {
    /// Serialized width under the given index parameters
    #[must_use]
    pub fn width(&self, info: &TableInfo) -> u8 {
        match self {
            DataKind::Fixed(bytes) => *bytes,
            DataKind::TableIndex(table) => info.table_index_bytes(*table),
            DataKind::CodedIndex(coded) => info.coded_index_bytes(*coded),
            DataKind::HeapIndex(heap) => info.heap_bytes(*heap),
            DataKind::RawDataReference => 4,
        }
    }
}

/// The value strategy of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCodec {
    /// 1-byte constant
    U8,
    /// 2-byte constant
    U16,
    /// 4-byte constant
    U32,
    /// A 32-bit logical value always written as 16 bits; higher bits are dropped on write
    U32As16,
    /// An index into one table
    TableIndex(TableId),
    /// The first row of a contiguous run in another table (`FieldList`, `MethodList`, ...)
    TableList(TableId),
    /// A coded index
    CodedIndex(CodedIndexType),
    /// A string from `#Strings` or a custom string heap
    String(HeapKind),
    /// A nullable GUID from `#GUID`
    Guid,
    /// A blob from `#Blob`
    Blob(BlobKind),
    /// Content referenced by RVA or offset
    RawData(RawDataKind),
}

impl ColumnCodec {
    /// The width-deciding kind of this codec
    #[must_use]
    pub fn data_kind(&self) -> DataKind {
        match self {
            ColumnCodec::U8 => DataKind::Fixed(1),
            ColumnCodec::U16 | ColumnCodec::U32As16 => DataKind::Fixed(2),
            ColumnCodec::U32 => DataKind::Fixed(4),
            ColumnCodec::TableIndex(table) | ColumnCodec::TableList(table) => {
                DataKind::TableIndex(*table)
            }
            ColumnCodec::CodedIndex(coded) => DataKind::CodedIndex(*coded),
            ColumnCodec::String(heap) => DataKind::HeapIndex(*heap),
            ColumnCodec::Guid => DataKind::HeapIndex(HeapKind::Guid),
            ColumnCodec::Blob(_) => DataKind::HeapIndex(HeapKind::Blob),
            ColumnCodec::RawData(_) => DataKind::RawDataReference,
        }
    }

    /// Returns true if this column holds a (non-list) table reference
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, ColumnCodec::TableIndex(_) | ColumnCodec::CodedIndex(_))
    }

    /// The value a freshly created row holds in this column
    #[must_use]
    pub fn default_cell(&self) -> Cell {
        match self {
            ColumnCodec::U8 | ColumnCodec::U16 | ColumnCodec::U32 | ColumnCodec::U32As16 => {
                Cell::Int(0)
            }
            ColumnCodec::TableIndex(_) | ColumnCodec::CodedIndex(_) => Cell::Index(None),
            ColumnCodec::TableList(table) => Cell::list(*table, 0),
            ColumnCodec::String(_) => Cell::Str(String::new()),
            ColumnCodec::Guid => Cell::Guid(None),
            ColumnCodec::Blob(_) => Cell::Blob(super::Blob::Bytes(Vec::new())),
            ColumnCodec::RawData(_) => Cell::RawData(RawData::None),
        }
    }

    /// Check that `cell` is a valid value for this column.
    ///
    /// # Errors
    /// Returns a description of the mismatch.
    pub fn check(&self, cell: &Cell) -> std::result::Result<(), String> {
        match (self, cell) {
            (ColumnCodec::U8, Cell::Int(value)) if *value <= 0xFF => Ok(()),
            (ColumnCodec::U16, Cell::Int(value)) if *value <= 0xFFFF => Ok(()),
            (ColumnCodec::U32 | ColumnCodec::U32As16, Cell::Int(_)) => Ok(()),
            (ColumnCodec::TableIndex(table), Cell::Index(index)) => match index {
                Some(TableIndex { table: target, .. }) if target != table => {
                    Err(format!("expected an index into {table}, got {target}"))
                }
                _ => Ok(()),
            },
            (ColumnCodec::TableList(table), Cell::Index(Some(index))) => {
                if index.table == *table {
                    Ok(())
                } else {
                    Err(format!("expected a list into {table}, got {}", index.table))
                }
            }
            (ColumnCodec::CodedIndex(coded), Cell::Index(index)) => match index {
                Some(index) if !coded.accepts(index.table) => Err(format!(
                    "{} is not a target of coded index {coded:?}",
                    index.table
                )),
                _ => Ok(()),
            },
            (ColumnCodec::String(_), Cell::Str(_))
            | (ColumnCodec::Guid, Cell::Guid(_))
            | (ColumnCodec::Blob(_), Cell::Blob(_))
            | (ColumnCodec::RawData(_), Cell::RawData(_)) => Ok(()),
            (codec, cell) => Err(format!("cell {cell:?} does not fit codec {codec:?}")),
        }
    }
}

/// A named column of a table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name, as in ECMA-335 II.22
    pub name: &'static str,
    /// Value strategy
    pub codec: ColumnCodec,
}

impl ColumnDescriptor {
    /// Create a column descriptor
    #[must_use]
    pub const fn new(name: &'static str, codec: ColumnCodec) -> Self {
        ColumnDescriptor { name, codec }
    }

    /// The width-deciding kind of this column
    #[must_use]
    pub fn data_kind(&self) -> DataKind {
        self.codec.data_kind()
    }

    /// Serialized width under the given index parameters
    #[must_use]
    pub fn width(&self, info: &TableInfo) -> u8 {
        self.codec.data_kind().width(info)
    }
}
